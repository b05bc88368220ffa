//! Invocation execution through `invoke`.

use capcompat_protocol::codec::OutboundCodec;
use capcompat_protocol::multibase::base64pad;
use capcompat_protocol::{
    record, AgentMessage, CarCodec, Delegation, Did, HttpResponse, Receipt, Record, Signer,
};
use reqwest::Url;

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::process;

/// Everything needed to invoke one ability against a service.
#[derive(Debug, Clone)]
pub struct InvocationParams<'a> {
    pub url: Url,
    pub issuer: &'a Signer,
    pub audience: Did,
    pub resource: Did,
    pub ability: String,
    pub caveats: Option<Record>,
    pub proof: Option<&'a Delegation>,
}

impl<'a> InvocationParams<'a> {
    pub fn new(
        url: Url,
        issuer: &'a Signer,
        audience: Did,
        resource: Did,
        ability: impl Into<String>,
    ) -> Self {
        Self {
            url,
            issuer,
            audience,
            resource,
            ability: ability.into(),
            caveats: None,
            proof: None,
        }
    }

    pub fn with_caveats(mut self, caveats: Record) -> Self {
        self.caveats = Some(caveats);
        self
    }

    pub fn with_proof(mut self, proof: &'a Delegation) -> Self {
        self.proof = Some(proof);
        self
    }

    fn args(&self) -> Result<Vec<String>> {
        let issuer = self.issuer.format().map_err(|source| DriverError::Key {
            algorithm: self.issuer.algorithm(),
            source,
        })?;

        let mut args = vec![
            "invoke".to_string(),
            "--url".to_string(),
            self.url.to_string(),
            "--issuer".to_string(),
            issuer,
            "--audience".to_string(),
            self.audience.to_string(),
            "--resource".to_string(),
            self.resource.to_string(),
            "--ability".to_string(),
            self.ability.clone(),
        ];
        if let Some(caveats) = &self.caveats {
            args.push("--caveats".to_string());
            args.push(record::encode_string(caveats).map_err(DriverError::Caveats)?);
        }
        if let Some(proof) = self.proof {
            args.push("--proof".to_string());
            args.push(base64pad::encode(&proof.archive()?));
        }
        Ok(args)
    }
}

/// The single receipt of an invocation, plus the message it arrived in.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub receipt: Receipt,
    pub message: AgentMessage,
}

impl Driver {
    /// Have this implementation's client invoke an ability and decode the
    /// response. The response must carry exactly one receipt.
    pub async fn invoke(&self, params: InvocationParams<'_>) -> Result<InvocationOutcome> {
        let argv = self.config.argv(params.args()?)?;
        let captured = process::run(&self.cwd, &argv).await?;

        let out = captured.decode()?;
        let response = HttpResponse::from_record(&out).map_err(|e| captured.decode_error(e))?;
        let message = CarCodec
            .decode(&response)
            .map_err(|e| captured.response_error(e))?;

        if message.receipt_count() != 1 {
            return Err(DriverError::ReceiptCount(message.receipt_count()));
        }
        let receipt = message
            .receipts
            .values()
            .next()
            .cloned()
            .ok_or(DriverError::ReceiptCount(0))?;

        tracing::debug!(
            implementation = %self.name(),
            ability = %params.ability,
            receipt = %receipt.cid,
            "invocation completed"
        );
        Ok(InvocationOutcome { receipt, message })
    }
}
