//! Outbound HTTP client for peer control-plane calls
//!
//! Thin wrapper over `reqwest` that turns non-success statuses into
//! `Error::PeerRejected` so callers can branch on the peer's exact verdict.

use crate::common::{Error, Result};
use crate::galaxy::SiblingStar;
use crate::message::MessageRecord;
use crate::star::MemberRecord;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// Response envelope for accepted messages.
#[derive(Debug, Deserialize)]
struct MsgIdReply {
    #[serde(rename = "msg-id")]
    msg_id: String,
}

#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    fn base(ip: IpAddr, port: u16) -> String {
        format!("http://{}:{}", ip, port)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(Error::PeerRejected {
                status: resp.status().as_u16(),
            })
        }
    }

    // === Star directory (member -> coordinator) ===

    pub async fn register_member(
        &self,
        ip: IpAddr,
        port: u16,
        record: &MemberRecord,
    ) -> Result<()> {
        let url = format!("{}/v1/system?star={}", Self::base(ip, port), record.star);
        let resp = self.http.post(&url).json(record).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn update_member(&self, ip: IpAddr, port: u16, record: &MemberRecord) -> Result<()> {
        let url = format!(
            "{}/v1/system/{}?star={}",
            Self::base(ip, port),
            record.component,
            record.star
        );
        let resp = self.http.patch(&url).json(record).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn deregister_member(
        &self,
        ip: IpAddr,
        port: u16,
        id: &str,
        star: &str,
    ) -> Result<()> {
        let url = format!("{}/v1/system/{}?star={}", Self::base(ip, port), id, star);
        let resp = self.http.delete(&url).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Liveness probe; returns the peer's HTTP status code.
    pub async fn member_status(
        &self,
        ip: IpAddr,
        port: u16,
        id: &str,
        star: &str,
    ) -> Result<u16> {
        let url = format!("{}/v1/system/{}?star={}", Self::base(ip, port), id, star);
        let resp = self.http.get(&url).send().await?;
        Ok(resp.status().as_u16())
    }

    // === Messages (member -> coordinator, coordinator -> sibling) ===

    /// Forward a message to the local coordinator and return the assigned id.
    pub async fn forward_message(
        &self,
        ip: IpAddr,
        port: u16,
        star: &str,
        message: &MessageRecord,
    ) -> Result<String> {
        let url = format!("{}/v2/messages?star={}", Self::base(ip, port), star);
        let resp = self.http.post(&url).json(message).send().await?;
        let reply: MsgIdReply = Self::check(resp).await?.json().await?;
        Ok(reply.msg_id)
    }

    /// Deliver a stored message to a sibling coordinator on its galaxy port.
    pub async fn relay_message(
        &self,
        ip: IpAddr,
        port: u16,
        star: &str,
        message: &MessageRecord,
    ) -> Result<()> {
        let url = format!(
            "{}/v1/messages/{}?star={}",
            Self::base(ip, port),
            message.msg_id.as_deref().unwrap_or_default(),
            star
        );
        let resp = self.http.post(&url).json(message).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn forward_delete(&self, ip: IpAddr, port: u16, id: &str, star: &str) -> Result<()> {
        let url = format!("{}/v1/messages/{}?star={}", Self::base(ip, port), id, star);
        let resp = self.http.delete(&url).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn forward_list(
        &self,
        ip: IpAddr,
        port: u16,
        star: &str,
        scope: &str,
        view: &str,
    ) -> Result<serde_json::Value> {
        let url = format!(
            "{}/v1/messages?star={}&scope={}&view={}",
            Self::base(ip, port),
            star,
            scope,
            view
        );
        let resp = self.http.get(&url).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn forward_get(
        &self,
        ip: IpAddr,
        port: u16,
        id: &str,
        star: &str,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/v1/messages/{}?star={}", Self::base(ip, port), id, star);
        let resp = self.http.get(&url).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    // === Galaxy directory (coordinator -> sibling coordinator) ===

    /// Register with a sibling's galaxy directory; the sibling answers with
    /// its own descriptor.
    pub async fn register_star(
        &self,
        ip: IpAddr,
        port: u16,
        descriptor: &SiblingStar,
    ) -> Result<SiblingStar> {
        let url = format!("{}/v1/star", Self::base(ip, port));
        let resp = self.http.post(&url).json(descriptor).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn update_star(
        &self,
        ip: IpAddr,
        port: u16,
        descriptor: &SiblingStar,
    ) -> Result<SiblingStar> {
        let url = format!("{}/v1/star/{}", Self::base(ip, port), descriptor.star);
        let resp = self.http.patch(&url).json(descriptor).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn deregister_star(&self, ip: IpAddr, port: u16, star: &str) -> Result<()> {
        let url = format!("{}/v1/star/{}?star={}", Self::base(ip, port), star, star);
        let resp = self.http.delete(&url).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}
