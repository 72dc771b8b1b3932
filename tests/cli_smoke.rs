//! Binary smoke tests

use assert_cmd::Command;
use std::io::Write;

const MOCK_SEED: &str = "0x6176616c616e63686520636c6920736565642030303030303030303030303030";

fn wallet_cli() -> Command {
    let mut cmd = Command::cargo_bin("wallet-cli").unwrap();
    cmd.env_remove("AVAX_WALLET_CONFIG").env("RUST_LOG", "warn");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn help_lists_commands() {
    let out = stdout_of(wallet_cli().arg("--help"));
    for command in ["get-address", "get-balance", "get-new-receive-address", "sign-unsigned"] {
        assert!(out.contains(command), "missing {} in help", command);
    }
}

#[test]
fn get_address_with_software_signer() {
    let out = stdout_of(wallet_cli().args(["--mock-seed", MOCK_SEED, "get-address", "X", "0/0"]));
    let address = out.trim();
    assert!(address.starts_with("X-local1"), "{}", address);

    let again = stdout_of(wallet_cli().args(["--mock-seed", MOCK_SEED, "get-address", "x", "0/0"]));
    assert_eq!(again.trim(), address);
}

#[test]
fn c_chain_address_is_hex() {
    let out = stdout_of(wallet_cli().args(["--mock-seed", MOCK_SEED, "get-address", "C", "1/3"]));
    let address = out.trim();
    assert!(address.starts_with("C-0x"), "{}", address);
    assert_eq!(address.len(), "C-0x".len() + 40);
}

#[test]
fn network_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "network = \"fuji\"").unwrap();

    let out = stdout_of(
        wallet_cli()
            .arg("--config")
            .arg(file.path())
            .args(["--mock-seed", MOCK_SEED, "get-address", "P", "0/1"]),
    );
    assert!(out.trim().starts_with("P-fuji1"), "{}", out);
}

#[test]
fn malformed_path_is_rejected() {
    wallet_cli()
        .args(["--mock-seed", MOCK_SEED, "get-address", "X", "2/0"])
        .assert()
        .failure();
}

#[test]
fn unknown_network_is_rejected() {
    wallet_cli()
        .args(["--network", "nowhere", "--mock-seed", MOCK_SEED, "get-address", "X", "0/0"])
        .assert()
        .failure();
}
