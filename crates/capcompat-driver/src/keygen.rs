//! Key generation through `key gen`.

use capcompat_protocol::{record, Did, Ipld, KeyAlgorithm, Signer};

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::process;

impl Driver {
    /// Ask the implementation for a fresh key and decode it into a signer.
    ///
    /// Defaults to ed25519.
    pub async fn generate_key(&self, algorithm: Option<KeyAlgorithm>) -> Result<Signer> {
        let algorithm = algorithm.unwrap_or_default();
        let argv = self
            .config
            .argv(["key", "gen", "--type", algorithm.name()])?;
        let captured = process::run(&self.cwd, &argv).await?;

        let out = captured.decode()?;
        let key = record::bytes_field(&out, "key").map_err(|e| captured.decode_error(e))?;
        let signer =
            Signer::decode(algorithm, key).map_err(|source| captured.key_error(algorithm, source))?;

        if let Some(Ipld::String(id)) = record::field(&out, "id") {
            let reported = Did::parse(id).map_err(|source| DriverError::InvalidDid {
                value: id.clone(),
                source,
            })?;
            let derived = signer
                .did()
                .map_err(|source| captured.key_error(algorithm, source))?;
            if reported != derived {
                tracing::warn!(
                    implementation = %self.name(),
                    reported = %reported,
                    derived = %derived,
                    "reported key id does not match the decoded key"
                );
            }
        }

        tracing::debug!(implementation = %self.name(), %algorithm, "generated key");
        Ok(signer)
    }
}
