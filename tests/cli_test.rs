use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("iap-bridge"));
    cmd.arg("tests/fixtures/session.csv")
        .args(["--catalog", "tests/fixtures/catalog.json"])
        .args(["--callback-id", "42"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"method":"getTransactionId","value":"tx-101"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"method":"getSignature","value":"signature.1"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"method":"getAccessToken","value":"token-1"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"method":"isConnected","value":true}"#,
        ))
        .stdout(predicate::str::contains(r#""price_amount":4.99"#))
        .stdout(predicate::str::contains(
            r#"{"args":["gold.token.1","signature.1","gold"],"callback_id":42,"event":"purchase_success"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"args":["gold.token.1","signature.1","gold"],"callback_id":42,"event":"consume_success"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"args":[],"callback_id":42,"event":"purchase_cancel"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"args":[],"callback_id":42,"event":"consume_not_required"}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"args":[],"callback_id":42,"event":"iap_disconnected"}"#,
        ));

    Ok(())
}

#[test]
fn test_cli_no_auto_consume() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("iap-bridge"));
    cmd.arg("tests/fixtures/session.csv")
        .args(["--catalog", "tests/fixtures/catalog.json"])
        .args(["--callback-id", "42"])
        .arg("--no-auto-consume");

    // The purchase stays unconsumed until the script clears it.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"args":["gold.token.1","signature.1","gold"],"callback_id":42,"event":"consume_success"}"#,
        ))
        .stdout(predicate::str::contains("consume_not_required").not());

    Ok(())
}

#[test]
fn test_cli_missing_script() {
    let mut cmd = Command::new(cargo_bin!("iap-bridge"));
    cmd.arg("tests/fixtures/does_not_exist.csv");

    cmd.assert().failure();
}
