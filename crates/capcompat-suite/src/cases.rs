//! The shared compatibility cases.

use anyhow::{ensure, Context};
use capcompat_driver::{Driver, DriverError, InvocationParams};
use capcompat_protocol::{record, Ipld, KeyAlgorithm, Signer};

use crate::case::{CaseFuture, TestCase, TestContext};

/// Ability every implementation's server must provide: answer with the
/// caveats it was invoked with.
pub const ECHO_ABILITY: &str = "test/echo";

/// Every shared case, in run order.
pub fn all() -> Vec<TestCase> {
    vec![
        TestCase::new("generates a key", generates_a_key),
        TestCase::new("generates an RSA key", generates_an_rsa_key),
        TestCase::new("starts a server", starts_a_server),
        TestCase::new("stops an unknown service", stops_an_unknown_service),
        TestCase::new("echoes caveats", echoes_caveats),
    ]
}

async fn generate_checked(driver: &Driver, algorithm: KeyAlgorithm) -> anyhow::Result<Signer> {
    let signer = driver
        .generate_key(Some(algorithm))
        .await
        .with_context(|| format!("{} failed to generate a {algorithm} key", driver.name()))?;

    let did = signer.did()?;
    ensure!(!did.as_str().is_empty(), "derived DID is empty");

    let decoded = Signer::decode(algorithm, &signer.encode()?)?;
    ensure!(
        decoded.did()? == did,
        "{algorithm} key does not survive an encode/decode round trip"
    );

    tracing::info!(implementation = %driver.name(), %did, "generated {algorithm} key");
    Ok(signer)
}

fn generates_a_key(ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move {
        generate_checked(ctx.client, KeyAlgorithm::Ed25519).await?;
        generate_checked(ctx.server, KeyAlgorithm::Ed25519).await?;
        anyhow::Ok(())
    })
}

fn generates_an_rsa_key(ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move {
        generate_checked(ctx.client, KeyAlgorithm::Rsa).await?;
        anyhow::Ok(())
    })
}

fn starts_a_server(ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move {
        let service = ctx.client.start_service().await?;
        tracing::info!(service = %service.id, url = %service.url, "client service started");
        ctx.client.stop_service(&service.id).await?;
        anyhow::Ok(())
    })
}

fn stops_an_unknown_service(ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move {
        match ctx.server.stop_service("did:key:nonexistent").await {
            Err(DriverError::UnknownService(_)) => Ok(()),
            Err(err) => Err(anyhow::Error::new(err).context("expected unknown service error")),
            Ok(()) => anyhow::bail!("stopping an unknown service succeeded"),
        }
    })
}

fn echoes_caveats(ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move {
        let signer = ctx.client.generate_key(None).await?;
        let caveats = record::map([("echo", Ipld::String("hello".to_string()))]);

        let params = InvocationParams::new(
            ctx.service.url.clone(),
            &signer,
            ctx.service.id.clone(),
            signer.did()?,
            ECHO_ABILITY,
        )
        .with_caveats(caveats.clone());
        let outcome = ctx.client.invoke(params).await?;

        ensure!(
            outcome.receipt.out.error().is_none(),
            "invocation failed: {:?}",
            outcome.receipt.out.error()
        );
        ensure!(
            outcome.receipt.out.ok() == Some(&caveats),
            "expected echo of {caveats:?}, got {:?}",
            outcome.receipt.out.ok()
        );
        Ok(())
    })
}
