//! 派生路径注册表
//!
//! Static catalog of the named BIP44-style templates understood by every
//! backend. Each template carries exactly one `<account>` placeholder.

use serde::Serialize;

/// Placeholder segment substituted with the account index.
pub const ACCOUNT_PLACEHOLDER: &str = "<account>";

/// Offset added to a segment carrying the hardened marker.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Named derivation path template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DerivationPath {
    pub name: &'static str,
    pub path: &'static str,
    /// Set when the placeholder sits at or above a hardened boundary, so every
    /// index must be queried from the root.
    #[serde(rename = "isHardened")]
    pub is_hardened: bool,
}

impl DerivationPath {
    pub const fn new(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            is_hardened: false,
        }
    }

    pub const fn hardened(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            is_hardened: true,
        }
    }

    /// Whether the placeholder segment itself carries the hardened marker.
    pub fn placeholder_is_hardened(&self) -> bool {
        self.path.contains("<account>'")
    }
}

pub const DEFAULT_ETH: DerivationPath = DerivationPath::new("Default (ETH)", "m/44'/60'/0'/0/<account>");
pub const LEDGER_ETH: DerivationPath = DerivationPath::new("Ledger (ETH)", "m/44'/60'/0'/<account>");
pub const LEDGER_ETC: DerivationPath = DerivationPath::new("Ledger (ETC)", "m/44'/60'/160720'/0'/<account>");
pub const DEFAULT_ETC: DerivationPath = DerivationPath::new("Default (ETC)", "m/44'/61'/0'/0/<account>");
pub const TESTNET_ETH: DerivationPath = DerivationPath::new("Testnet (ETH)", "m/44'/1'/0'/0/<account>");
pub const DEFAULT_EXP: DerivationPath = DerivationPath::new("Default (EXP)", "m/44'/40'/0'/0/<account>");
pub const DEFAULT_UBQ: DerivationPath = DerivationPath::new("Default (UBQ)", "m/44'/108'/0'/0/<account>");
pub const DEFAULT_TOMO: DerivationPath = DerivationPath::new("Default (TOMO)", "m/44'/889'/0'/0/<account>");
pub const DEFAULT_ELLA: DerivationPath = DerivationPath::new("Default (ELLA)", "m/44'/163'/0'/0/<account>");
pub const DEFAULT_MUSIC: DerivationPath = DerivationPath::new("Default (MUSIC)", "m/44'/184'/0'/0/<account>");
pub const DEFAULT_EGEM: DerivationPath = DerivationPath::new("Default (EGEM)", "m/44'/1987'/0'/0/<account>");
pub const DEFAULT_CLO: DerivationPath = DerivationPath::new("Default (CLO)", "m/44'/820'/0'/0/<account>");
pub const TESTNET_RSK: DerivationPath = DerivationPath::new("Testnet (RSK)", "m/44'/37310'/0'/0/<account>");
pub const MAINNET_RSK: DerivationPath = DerivationPath::new("Mainnet (RSK)", "m/44'/137'/0'/0/<account>");
pub const DEFAULT_GO: DerivationPath = DerivationPath::new("Default (GO)", "m/44'/6060'/0'/0/<account>");
pub const DEFAULT_AKA: DerivationPath = DerivationPath::new("Default (AKA)", "m/44'/200625'/0'/0/<account>");
pub const DEFAULT_PIRL: DerivationPath = DerivationPath::new("Default (PIRL)", "m/44'/164'/0'/0/<account>");
pub const DEFAULT_ATH: DerivationPath = DerivationPath::new("Default (ATH)", "m/44'/1620'/0'/0/<account>");
pub const DEFAULT_ETHO: DerivationPath = DerivationPath::new("Default (ETHO)", "m/44'/1313114'/0'/0/<account>");
pub const DEFAULT_MIX: DerivationPath = DerivationPath::new("Default (MIX)", "m/44'/76'/0'/0/<account>");
pub const DEFAULT_REOSC: DerivationPath = DerivationPath::new("Default (REOSC)", "m/44'/2894'/0'/0/<account>");
pub const DEFAULT_THUNDERCORE: DerivationPath =
    DerivationPath::new("Default (THUNDERCORE)", "m/44'/1001'/0'/0/<account>");
pub const DEFAULT_WEB: DerivationPath = DerivationPath::new("Default (WEB)", "m/44'/227'/0'/0/<account>");
pub const DEFAULT_METADIUM: DerivationPath =
    DerivationPath::new("Default (METADIUM)", "m/44'/916'/0'/0/<account>");
pub const DEFAULT_DEXON: DerivationPath = DerivationPath::new("Default (DEXON)", "m/44'/237'/0'/0/<account>");
pub const DEFAULT_ASK: DerivationPath = DerivationPath::new("Default (ASK)", "m/44'/2221'/0'/0/<account>");
pub const DEFAULT_AUX: DerivationPath = DerivationPath::new("Default (AUX)", "m/44'/344'/0'/0/<account>");
pub const DEFAULT_ERE: DerivationPath = DerivationPath::new("Default (ERE)", "m/44'/466'/0'/0/<account>");
pub const DEFAULT_EWC: DerivationPath = DerivationPath::new("Default (EWC)", "m/44'/246'/0'/0/<account>");
pub const DEFAULT_VOLTA: DerivationPath = DerivationPath::new("Default (VOLTA)", "m/44'/73799'/0'/0/<account>");
pub const LEDGER_LIVE_ETH: DerivationPath =
    DerivationPath::hardened("Ledger Live (ETH)", "m/44'/60'/<account>'/0/0");
pub const LEDGER_LIVE_ETC: DerivationPath =
    DerivationPath::hardened("Ledger Live (ETC)", "m/44'/61'/<account>'/0/0");
pub const DEFAULT_EVRICE: DerivationPath = DerivationPath::new("Default (EVC)", "m/44'/1020'/0'/0/<account>");
pub const DEFAULT_ARTIS_SIGMA1: DerivationPath =
    DerivationPath::new("Sigma1 (ATS)", "m/44'/246529'/0'/0/<account>");
pub const DEFAULT_POA: DerivationPath = DerivationPath::new("Default (POA)", "m/44'/178'/0'/0/<account>");
pub const DEFAULT_ARTIS_TAU1: DerivationPath = DerivationPath::new("Tau1 (ATS)", "m/44'/246785'/0'/0/<account>");
pub const DEFAULT_ETI: DerivationPath = DerivationPath::new("Default (ETI)", "m/44'/464'/0'/0/<account>");
pub const DEFAULT_POLYGON: DerivationPath = DerivationPath::new("Polygon", "m/44'/966'/0'/0/<account>");
pub const DEFAULT_BSC: DerivationPath = DerivationPath::new("Default (BSC)", "m/44'/714'/0'/0/<account>");
pub const DEFAULT_XDAI: DerivationPath = DerivationPath::new("Default (XDAI)", "m/44'/700'/0'/0/<account>");
pub const DEFAULT_HECO: DerivationPath = DerivationPath::new("Default (HECO)", "m/44'/1010'/0'/0/<account>");
pub const DEFAULT_AVAX: DerivationPath = DerivationPath::new("Default (AVAX)", "m/44'/9000'/0'/0/<account>");

/// Children of an imported extended key, reached one at a time.
pub const EXTENDED_KEY_CHILDREN: DerivationPath =
    DerivationPath::hardened("Extended Key Children", "m/<account>");

pub static ALL_DERIVATION_PATHS: &[DerivationPath] = &[
    DEFAULT_ETH,
    LEDGER_ETH,
    LEDGER_ETC,
    DEFAULT_ETC,
    TESTNET_ETH,
    DEFAULT_EXP,
    DEFAULT_UBQ,
    DEFAULT_TOMO,
    DEFAULT_ELLA,
    DEFAULT_MUSIC,
    DEFAULT_EGEM,
    DEFAULT_CLO,
    TESTNET_RSK,
    MAINNET_RSK,
    DEFAULT_GO,
    DEFAULT_AKA,
    DEFAULT_PIRL,
    DEFAULT_ATH,
    DEFAULT_ETHO,
    DEFAULT_MIX,
    DEFAULT_REOSC,
    DEFAULT_THUNDERCORE,
    DEFAULT_WEB,
    DEFAULT_METADIUM,
    DEFAULT_DEXON,
    DEFAULT_ASK,
    DEFAULT_AUX,
    DEFAULT_ERE,
    DEFAULT_EWC,
    DEFAULT_VOLTA,
    LEDGER_LIVE_ETH,
    LEDGER_LIVE_ETC,
    DEFAULT_AVAX,
    DEFAULT_EVRICE,
    DEFAULT_ARTIS_SIGMA1,
    DEFAULT_POA,
    DEFAULT_ARTIS_TAU1,
    DEFAULT_ETI,
    DEFAULT_POLYGON,
    DEFAULT_BSC,
    DEFAULT_XDAI,
    DEFAULT_HECO,
];

/// The Ledger Ethereum app only accepts paths under `m/44'/60'` and `m/44'/1'`.
pub static LEDGER_DERIVATION_PATHS: &[DerivationPath] =
    &[DEFAULT_ETH, LEDGER_ETH, LEDGER_ETC, TESTNET_ETH, LEDGER_LIVE_ETH];

/// Paths offered for Trezor: every regular path, since each hardened index
/// would need its own confirmation on the device.
pub fn trezor_derivation_paths() -> impl Iterator<Item = &'static DerivationPath> {
    ALL_DERIVATION_PATHS.iter().filter(|path| !path.is_hardened)
}

/// Look up a registry entry by its display name.
pub fn find_by_name(name: &str) -> Option<&'static DerivationPath> {
    ALL_DERIVATION_PATHS
        .iter()
        .chain(std::iter::once(&EXTENDED_KEY_CHILDREN))
        .find(|path| path.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_template_has_one_placeholder() {
        for path in ALL_DERIVATION_PATHS.iter().chain([&EXTENDED_KEY_CHILDREN]) {
            assert_eq!(path.path.matches(ACCOUNT_PLACEHOLDER).count(), 1, "{}", path.name);
            assert!(path.path.starts_with("m/"), "{}", path.name);
        }
    }

    #[test]
    fn test_hardened_flag_matches_template() {
        for path in ALL_DERIVATION_PATHS {
            assert_eq!(path.is_hardened, path.placeholder_is_hardened(), "{}", path.name);
        }
        assert!(EXTENDED_KEY_CHILDREN.is_hardened);
        assert!(!EXTENDED_KEY_CHILDREN.placeholder_is_hardened());
    }

    #[test]
    fn test_templates_are_unique() {
        let templates: HashSet<_> = ALL_DERIVATION_PATHS.iter().map(|p| p.path).collect();
        assert_eq!(templates.len(), ALL_DERIVATION_PATHS.len());
    }

    #[test]
    fn test_trezor_paths_exclude_hardened() {
        let paths: Vec<_> = trezor_derivation_paths().collect();
        assert_eq!(paths.len(), ALL_DERIVATION_PATHS.len() - 2);
        assert!(!paths.contains(&&LEDGER_LIVE_ETH));
        assert!(!paths.contains(&&LEDGER_LIVE_ETC));
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(find_by_name("Default (ETH)"), Some(&DEFAULT_ETH));
        assert_eq!(find_by_name("ledger live (eth)"), Some(&LEDGER_LIVE_ETH));
        assert_eq!(find_by_name("Extended Key Children"), Some(&EXTENDED_KEY_CHILDREN));
        assert_eq!(find_by_name("nope"), None);
    }
}
