#![allow(dead_code)]

use avax_hw_wallet::blockchain::avalanche::transaction::{SigSlot, TransferableInput};
use avax_hw_wallet::blockchain::avalanche::AddressCodec;
use avax_hw_wallet::blockchain::mock::MockChainQuery;
use avax_hw_wallet::core::bip44::{Bip32Path, DerivationPath, KeyDeriver};
use avax_hw_wallet::core::domain::{AppVersion, Chain, NetworkParams, PublicKeyHash};
use avax_hw_wallet::core::wallet_manager::AddressRecord;
use avax_hw_wallet::hardware::{HardwareSigner, MockSigner};

pub const SEED: &[u8] = b"avalanche integration test seed";

pub fn signer(version: AppVersion) -> MockSigner {
    MockSigner::from_seed(SEED, version).unwrap()
}

pub fn codec() -> AddressCodec {
    AddressCodec::new(&NetworkParams::local()).unwrap()
}

/// Account deriver of the test seed.
pub async fn deriver() -> KeyDeriver {
    let mut signer = signer(AppVersion::new(0, 5, 0));
    let account = signer
        .get_extended_public_key(&Bip32Path::avalanche_account(0))
        .await
        .unwrap();
    KeyDeriver::new(&account).unwrap()
}

pub fn pkh(deriver: &KeyDeriver, path: DerivationPath) -> PublicKeyHash {
    deriver.derive_pkh(&path).unwrap()
}

pub fn address(deriver: &KeyDeriver, chain: Chain, path: DerivationPath) -> String {
    codec().pkh_to_address(chain, &pkh(deriver, path)).unwrap()
}

/// Oracle holding one UTXO of `amount` at each path.
pub fn oracle(deriver: &KeyDeriver, chain: Chain, funded: &[(DerivationPath, u64)]) -> MockChainQuery {
    funded.iter().fold(MockChainQuery::new(), |oracle, (path, amount)| {
        oracle.fund(chain, &address(deriver, chain, *path), pkh(deriver, *path), *amount)
    })
}

/// Record covering the first `count` indices of both branches.
pub fn record(deriver: &KeyDeriver, chain: Chain, count: u32) -> AddressRecord {
    let mut record = AddressRecord::new();
    for index in 0..count {
        for path in [DerivationPath::non_change(index), DerivationPath::change(index)] {
            record.insert(path, address(deriver, chain, path), pkh(deriver, path));
        }
    }
    record
}

/// Input whose slots must be signed by `paths`, in that order.
pub fn input(deriver: &KeyDeriver, id: &str, paths: &[DerivationPath]) -> TransferableInput {
    TransferableInput {
        utxo_id: id.to_string(),
        sig_slots: paths
            .iter()
            .enumerate()
            .map(|(i, path)| SigSlot {
                sig_idx: i as u32,
                pkh: pkh(deriver, *path),
            })
            .collect(),
    }
}
