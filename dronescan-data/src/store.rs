/*!
Both detection rule sets, loaded together
*/

use std::path::Path;

use crate::rules::{NamePatterns, RuleDocumentParser};
use crate::vendor::{VendorPrefixSet, vendor_prefix};

/// Vendor prefixes plus labeled name patterns. Built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SignatureStore {
    pub vendors: VendorPrefixSet,
    pub names: NamePatterns,
}

impl SignatureStore {
    pub fn new(vendors: VendorPrefixSet, names: NamePatterns) -> Self {
        Self { vendors, names }
    }

    /// Load every source, degrading to empty rule sets where a source is unusable.
    pub fn load(
        primary_vendors: &Path,
        supplementary_vendors: &Path,
        include_supplementary: bool,
        name_rules: &Path,
        parser: &dyn RuleDocumentParser,
    ) -> Self {
        Self {
            vendors: VendorPrefixSet::load(primary_vendors, supplementary_vendors, include_supplementary),
            names: NamePatterns::load(name_rules, parser),
        }
    }

    /// The vendor prefix of `mac` if it is a known one
    pub fn vendor_hit(&self, mac: &str) -> Option<String> {
        vendor_prefix(mac).filter(|prefix| self.vendors.contains(prefix))
    }

    /// Labels whose patterns match `name`; never matches an empty name
    pub fn name_hits(&self, name: &str) -> Vec<String> {
        if name.is_empty() {
            return Vec::new();
        }
        self.names.matching_labels(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SignatureStore {
        SignatureStore::new(
            ["aa-bb-cc"].into_iter().collect(),
            NamePatterns::compile(vec![("any".to_string(), vec![".*".to_string()])]),
        )
    }

    #[test]
    fn vendor_hit_canonicalizes_the_address() {
        let store = store();
        assert_eq!(store.vendor_hit("aa-bb-cc-01-02-03").as_deref(), Some("AA:BB:CC"));
        assert_eq!(store.vendor_hit("AA:BB:CD:01:02:03"), None);
        assert_eq!(store.vendor_hit(""), None);
    }

    #[test]
    fn empty_name_never_matches() {
        let store = store();
        assert!(store.name_hits("").is_empty());
        assert_eq!(store.name_hits("x"), vec!["any"]);
    }
}
