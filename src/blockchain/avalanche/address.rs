//! Avalanche address encoding and validation
//!
//! Address format: `<chain-alias>-<payload>`
//! - X / P chain: bech32 payload, HRP from the active network (e.g. `X-avax1...`)
//! - C chain: `0x` hex payload (e.g. `C-0x...`)
//!
//! The HRP used for encoding always comes from the trusted network
//! configuration, never from the string being decoded.

use crate::core::domain::{Chain, NetworkParams, PublicKeyHash, PKH_LEN};
use crate::core::errors::WalletError;
use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use tracing::debug;

/// Bidirectional mapping between public-key hashes and address strings.
#[derive(Debug, Clone)]
pub struct AddressCodec {
    hrp: Hrp,
}

impl AddressCodec {
    pub fn new(network: &NetworkParams) -> Result<Self, WalletError> {
        let hrp = Hrp::parse(&network.hrp).map_err(|e| {
            WalletError::Config(format!("invalid HRP {:?} for {}: {}", network.hrp, network.name, e))
        })?;
        Ok(Self { hrp })
    }

    /// HRP of the configured network.
    pub fn hrp(&self) -> String {
        self.hrp.to_lowercase()
    }

    /// Encode a public-key hash for the given chain.
    pub fn pkh_to_address(&self, chain: Chain, pkh: &PublicKeyHash) -> Result<String, WalletError> {
        let payload = self.encode_payload(chain, pkh)?;
        Ok(format!("{}-{}", chain.alias(), payload))
    }

    /// Encode only the payload part, without the chain alias.
    pub fn encode_payload(&self, chain: Chain, pkh: &PublicKeyHash) -> Result<String, WalletError> {
        if chain.is_utxo_model() {
            bech32::encode::<Bech32>(self.hrp, pkh.as_bytes())
                .map_err(|e| WalletError::InvalidAddressFormat(format!("bech32 encoding failed: {}", e)))
        } else {
            Ok(format!("0x{}", pkh.to_hex()))
        }
    }

    /// `<alias>-<bech32>` form for any chain.
    ///
    /// The node addresses C-chain atomic UTXOs this way.
    pub fn bech32_address(&self, chain: Chain, pkh: &PublicKeyHash) -> Result<String, WalletError> {
        let payload = bech32::encode::<Bech32>(self.hrp, pkh.as_bytes())
            .map_err(|e| WalletError::InvalidAddressFormat(format!("bech32 encoding failed: {}", e)))?;
        Ok(format!("{}-{}", chain.alias(), payload))
    }

    /// Decode an address string into its chain and public-key hash.
    ///
    /// A bare payload without alias is accepted: hex means the C chain,
    /// bech32 means the X chain.
    pub fn address_to_chain(&self, address: &str) -> Result<(Chain, PublicKeyHash), WalletError> {
        let address = address.trim();
        let (alias, payload) = match address.split_once('-') {
            Some((alias, payload)) if alias.len() == 1 => (Some(alias), payload),
            _ => (None, address),
        };

        let is_hex = payload.starts_with("0x") || payload.starts_with("0X");
        let chain = match alias {
            Some(alias) => Chain::from_alias(alias)?,
            None if is_hex => Chain::C,
            None => Chain::X,
        };

        let pkh = match (chain.is_utxo_model(), is_hex) {
            (true, false) => self.decode_bech32(payload)?,
            (false, true) => decode_hex(&payload[2..])?,
            (true, true) => {
                return Err(WalletError::InvalidAddressFormat(format!(
                    "{}-chain address must be bech32: {}",
                    chain, address
                )))
            }
            (false, false) => {
                return Err(WalletError::InvalidAddressFormat(format!(
                    "{}-chain address must be 0x hex: {}",
                    chain, address
                )))
            }
        };

        debug!(chain = %chain, pkh = %pkh, "Decoded address");
        Ok((chain, pkh))
    }

    fn decode_bech32(&self, payload: &str) -> Result<PublicKeyHash, WalletError> {
        // Bech32 only; a Bech32m checksum over the same data is a different address.
        let checked = CheckedHrpstring::new::<Bech32>(payload)
            .map_err(|e| WalletError::InvalidAddressFormat(format!("{}: {}", payload, e)))?;
        let hrp = checked.hrp();
        if hrp.to_lowercase() != self.hrp.to_lowercase() {
            return Err(WalletError::InvalidAddressFormat(format!(
                "address HRP {:?} does not match network HRP {:?}",
                hrp.to_lowercase(),
                self.hrp.to_lowercase()
            )));
        }
        let data: Vec<u8> = checked.byte_iter().collect();
        PublicKeyHash::from_slice(&data)
    }
}

fn decode_hex(hex_str: &str) -> Result<PublicKeyHash, WalletError> {
    if hex_str.len() != PKH_LEN * 2 {
        return Err(WalletError::InvalidAddressFormat(format!(
            "hex payload must be {} characters, got {}",
            PKH_LEN * 2,
            hex_str.len()
        )));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|e| WalletError::InvalidAddressFormat(format!("invalid hex payload: {}", e)))?;
    PublicKeyHash::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn local_codec() -> AddressCodec {
        AddressCodec::new(&NetworkParams::local()).unwrap()
    }

    fn pkh(byte: u8) -> PublicKeyHash {
        PublicKeyHash([byte; PKH_LEN])
    }

    #[test]
    fn test_x_chain_roundtrip() {
        let codec = local_codec();
        let address = codec.pkh_to_address(Chain::X, &pkh(7)).unwrap();
        assert!(address.starts_with("X-local1"));
        assert_eq!(codec.address_to_chain(&address).unwrap(), (Chain::X, pkh(7)));
    }

    #[test]
    fn test_known_faucet_address_decodes() {
        // Funded faucet address of the local test network.
        let codec = local_codec();
        let (chain, decoded) = codec
            .address_to_chain("X-local18jma8ppw3nhx5r4ap8clazz0dps7rv5u00z96u")
            .unwrap();
        assert_eq!(chain, Chain::X);
        assert_eq!(
            codec.pkh_to_address(Chain::X, &decoded).unwrap(),
            "X-local18jma8ppw3nhx5r4ap8clazz0dps7rv5u00z96u"
        );
    }

    #[test]
    fn test_c_chain_hex() {
        let codec = local_codec();
        let address = codec.pkh_to_address(Chain::C, &pkh(0xab)).unwrap();
        assert_eq!(address, format!("C-0x{}", "ab".repeat(20)));
        assert_eq!(codec.address_to_chain(&address).unwrap(), (Chain::C, pkh(0xab)));
    }

    #[test]
    fn test_bare_payloads() {
        let codec = local_codec();
        let hex_bare = format!("0x{}", "01".repeat(20));
        assert_eq!(codec.address_to_chain(&hex_bare).unwrap(), (Chain::C, pkh(1)));

        let bech_bare = codec.encode_payload(Chain::X, &pkh(2)).unwrap();
        assert_eq!(codec.address_to_chain(&bech_bare).unwrap(), (Chain::X, pkh(2)));
    }

    #[test]
    fn test_bech32m_checksum_rejected() {
        use bech32::Bech32m;

        let codec = local_codec();
        let hrp = Hrp::parse("local").unwrap();
        let bech32m = bech32::encode::<Bech32m>(hrp, pkh(7).as_bytes()).unwrap();
        assert_ne!(format!("X-{}", bech32m), codec.pkh_to_address(Chain::X, &pkh(7)).unwrap());
        assert!(matches!(
            codec.address_to_chain(&format!("X-{}", bech32m)),
            Err(WalletError::InvalidAddressFormat(_))
        ));
        assert!(matches!(
            codec.address_to_chain(&bech32m),
            Err(WalletError::InvalidAddressFormat(_))
        ));
    }

    #[test]
    fn test_wrong_network_rejected() {
        let mainnet = AddressCodec::new(&NetworkParams::mainnet()).unwrap();
        let address = mainnet.pkh_to_address(Chain::P, &pkh(3)).unwrap();
        assert!(address.starts_with("P-avax1"));
        assert!(matches!(
            local_codec().address_to_chain(&address),
            Err(WalletError::InvalidAddressFormat(_))
        ));
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let codec = local_codec();
        let payload = codec.encode_payload(Chain::X, &pkh(4)).unwrap();
        assert!(matches!(
            codec.address_to_chain(&format!("Q-{}", payload)),
            Err(WalletError::UnsupportedChain(_))
        ));
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        let codec = local_codec();
        for bad in [
            "X-local1qqqqqq",
            "X-0x0101010101010101010101010101010101010101",
            "C-local1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq",
            "C-0x1234",
            "C-0xzz01010101010101010101010101010101010101",
            "",
        ] {
            assert!(
                matches!(codec.address_to_chain(bad), Err(WalletError::InvalidAddressFormat(_))),
                "expected InvalidAddressFormat for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let codec = local_codec();
        let mut address = codec.pkh_to_address(Chain::X, &pkh(9)).unwrap();
        let last = address.pop().unwrap();
        address.push(if last == 'q' { 'p' } else { 'q' });
        assert!(codec.address_to_chain(&address).is_err());
    }
}
