use std::path::{Path, PathBuf};

use capcompat_driver::Driver;
use capcompat_protocol::{
    record, Block, Ipld, KeyAlgorithm, MessageBuilder, Outcome, Receipt, Signer, CAR_CONTENT_TYPE,
};
use capcompat_suite::{CaseFuture, CompatSuite, TestCase, TestContext};
use tempfile::TempDir;

const ALICE: &str = "did:key:z6Mkk89bC3JrVqKie71YEcc5M1SMVxuCgNx6zLZ8SYJsxALi";

/// A fake implementation that honors every command of the process contract.
const IMPL_SCRIPT: &str = r#"case "$1 $2" in
  "key gen")
    cat "key-$4.json"
    ;;
  "server start")
    echo '{"id":"DID","url":"http://127.0.0.1:4567"}'
    exec sleep 30
    ;;
  invoke*)
    cat response.json
    ;;
  *)
    echo "unknown command: $*" >&2
    exit 1
    ;;
esac
"#;

fn key_record(signer: &Signer) -> String {
    record::encode_string(&record::map([
        ("id", Ipld::String(signer.did().unwrap().to_string())),
        ("key", Ipld::Bytes(signer.encode().unwrap())),
    ]))
    .unwrap()
}

/// A response whose single receipt echoes `{echo: "hello"}`.
fn echo_response() -> String {
    let signer = Signer::generate(KeyAlgorithm::Ed25519).unwrap();
    let ran = Block::encode(&record::map([("nonce", Ipld::Integer(1))])).unwrap();
    let echo = record::map([("echo", Ipld::String("hello".to_string()))]);
    let receipt = Receipt::issue(&signer, ran.cid, Outcome::Ok(echo)).unwrap();
    let body = MessageBuilder::new()
        .receipt(ran.cid, receipt)
        .build()
        .unwrap()
        .encode()
        .unwrap();

    record::encode_string(&record::map([
        (
            "headers",
            record::map([("content-type", Ipld::String(CAR_CONTENT_TYPE.to_string()))]),
        ),
        ("body", Ipld::Bytes(body)),
    ]))
    .unwrap()
}

fn write_impl(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("impl.sh"), IMPL_SCRIPT.replace("DID", ALICE)).unwrap();
    std::fs::write(
        dir.join("runner.config.json"),
        r#"{"command": "sh impl.sh", "stop": "signal"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("key-ed25519.json"),
        key_record(&Signer::generate(KeyAlgorithm::Ed25519).unwrap()),
    )
    .unwrap();
    std::fs::write(
        dir.join("key-rsa.json"),
        key_record(&Signer::generate_rsa(1024).unwrap()),
    )
    .unwrap();
    std::fs::write(dir.join("response.json"), echo_response()).unwrap();
    dir
}

fn pair() -> (TempDir, Driver, Driver) {
    let root = tempfile::tempdir().unwrap();
    let client = Driver::load(write_impl(root.path(), "go")).unwrap();
    let server = Driver::load(write_impl(root.path(), "js")).unwrap();
    (root, client, server)
}

#[tokio::test]
async fn test_shared_cases_pass_against_compliant_pair() {
    let (_root, client, server) = pair();
    let suite = CompatSuite::new(&client, &server);
    assert_eq!(suite.name(), "Compatibility go → js");

    let report = suite.run().await;
    for failure in report.failures() {
        eprintln!("{}: {:?}", failure.name, failure.error);
    }
    assert!(report.success());
    assert_eq!(report.passed_count(), 5);
    assert_eq!(report.client, "go");
    assert_eq!(report.server, "js");
    assert!(server.running_services().is_empty());
    assert!(client.running_services().is_empty());
}

fn passes(ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move {
        anyhow::ensure!(ctx.service.id.as_str() == ALICE, "wrong service injected");
        anyhow::ensure!(
            ctx.server.running_services() == vec![ALICE.to_string()],
            "service not running during body"
        );
        Ok(())
    })
}

fn fails(_ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move { Err::<(), _>(anyhow::anyhow!("receipt mismatch")) })
}

fn panics(_ctx: TestContext<'_>) -> CaseFuture<'_> {
    Box::pin(async move {
        let receipts: Vec<Receipt> = Vec::new();
        assert_eq!(receipts.len(), 1, "assertion exploded");
        anyhow::Ok(())
    })
}

#[tokio::test]
async fn test_service_is_stopped_on_every_exit_path() {
    let (_root, client, server) = pair();
    let cases = vec![
        TestCase::new("passes", passes),
        TestCase::new("fails", fails),
        TestCase::new("panics", panics),
    ];

    let report = CompatSuite::with_cases(&client, &server, cases).run().await;

    assert_eq!(report.passed_count(), 1);
    assert_eq!(report.failed_count(), 2);
    assert_eq!(report.cases[1].error.as_deref(), Some("receipt mismatch"));
    assert!(report.cases[2]
        .error
        .as_deref()
        .unwrap()
        .contains("assertion exploded"));
    assert!(server.running_services().is_empty());
}

#[tokio::test]
async fn test_only_filters_cases() {
    let (_root, client, server) = pair();
    let suite = CompatSuite::new(&client, &server).only(&["starts a server".to_string()]);
    assert_eq!(suite.cases().len(), 1);

    let report = suite.run().await;
    assert!(report.success());
    assert_eq!(report.cases[0].name, "starts a server");
}

#[tokio::test]
async fn test_start_failure_fails_every_case() {
    let root = tempfile::tempdir().unwrap();
    let client = Driver::load(write_impl(root.path(), "go")).unwrap();
    let broken = root.path().join("rust");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("impl.sh"), "exit 1\n").unwrap();
    std::fs::write(
        broken.join("runner.config.json"),
        r#"{"command": "sh impl.sh"}"#,
    )
    .unwrap();
    let server = Driver::load(&broken).unwrap();

    let report = CompatSuite::new(&client, &server).run().await;
    assert_eq!(report.failed_count(), 5);
    assert!(report.cases[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("failed to start rust service"));
}
