use serde::{Deserialize, Serialize};

use crate::arch::{Arch, Os};

/// One per-architecture name of a logical image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageVariant {
    pub name: String,
    pub arch: Arch,
    #[serde(default)]
    pub os: Os,
}

/// All known variants of one logical image, keyed by the name pods use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiArchImages {
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageVariant>,
}

/// The catalog value stored under the images key.
///
/// Entries may repeat a `name`; readers take the first match and writers
/// only ever append, so the value is an order-preserving log of catalog
/// updates rather than a map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImagesList {
    #[serde(default)]
    pub list: Vec<MultiArchImages>,
}

impl ImagesList {
    /// Decodes a catalog value. Empty input decodes to the empty list.
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        if data.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(data)
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("images list serialization cannot fail")
    }

    /// Variants of `image`, first entry wins. `None` when the image has no
    /// catalog entry at all.
    pub fn variants_of(&self, image: &str) -> Option<&[ImageVariant]> {
        self.list
            .iter()
            .find(|entry| entry.name == image)
            .map(|entry| entry.images.as_slice())
    }

    /// The variant of `image` matching `arch`, if any.
    pub fn variant_for(&self, image: &str, arch: Arch) -> Option<&ImageVariant> {
        self.variants_of(image)?.iter().find(|v| v.arch == arch)
    }
}

/// Append-merges `additions` onto an encoded catalog value, preserving the
/// order of both lists. No deduplication happens on write.
pub fn update_images_data(
    old: &[u8],
    additions: &ImagesList,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut merged = ImagesList::decode(old)?;
    merged.list.extend(additions.list.iter().cloned());
    Ok(merged.encode())
}

/// The catalog value stored under the unavailable-images key: image names
/// known to lack a catalog entry, awaiting resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnavailableImages {
    #[serde(default)]
    pub images: Vec<String>,
}

impl UnavailableImages {
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        if data.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(data)
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("unavailable set serialization cannot fail")
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains(&self, image: &str) -> bool {
        self.images.iter().any(|i| i == image)
    }

    /// Inserts `image` unless already present. Returns whether the set grew.
    pub fn insert(&mut self, image: &str) -> bool {
        if self.contains(image) {
            return false;
        }
        self.images.push(image.to_string());
        true
    }

    /// Set-union with `names`, keeping existing order and appending new
    /// names in their given order. Returns whether anything changed.
    pub fn merge(&mut self, names: &[String]) -> bool {
        let mut changed = false;
        for name in names {
            changed |= self.insert(name);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(name: &str, arch: Arch) -> ImageVariant {
        ImageVariant {
            name: name.to_string(),
            arch,
            os: Os::Linux,
        }
    }

    fn entry(name: &str, variants: Vec<ImageVariant>) -> MultiArchImages {
        MultiArchImages {
            name: name.to_string(),
            images: variants,
        }
    }

    #[test]
    fn first_entry_wins_on_duplicate_names() {
        let list = ImagesList {
            list: vec![
                entry("redis", vec![variant("redis", Arch::Amd64)]),
                entry("redis", vec![variant("redis-arm64", Arch::Arm64)]),
            ],
        };
        let variants = list.variants_of("redis").unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].arch, Arch::Amd64);
    }

    #[test]
    fn update_images_data_appends_in_order() {
        let l1 = ImagesList {
            list: vec![entry("a", vec![variant("a", Arch::Amd64)])],
        };
        let l2 = ImagesList {
            list: vec![
                entry("b", vec![variant("b", Arch::Arm64)]),
                entry("a", vec![variant("a-arm", Arch::Arm)]),
            ],
        };
        let merged = update_images_data(&l1.encode(), &l2).unwrap();
        let decoded = ImagesList::decode(&merged).unwrap();
        let names: Vec<_> = decoded.list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "a"]);
        // Reader still sees the original entry for "a".
        assert_eq!(decoded.variants_of("a").unwrap()[0].arch, Arch::Amd64);
    }

    #[test]
    fn update_images_data_accepts_empty_prior_value() {
        let l2 = ImagesList {
            list: vec![entry("b", vec![variant("b", Arch::Arm64)])],
        };
        let merged = update_images_data(b"", &l2).unwrap();
        assert_eq!(ImagesList::decode(&merged).unwrap(), l2);
    }

    #[test]
    fn unavailable_insert_is_idempotent() {
        let mut set = UnavailableImages::default();
        assert!(set.insert("foo"));
        assert!(!set.insert("foo"));
        let before = set.clone();
        set.merge(&["foo".to_string()]);
        assert_eq!(set, before);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let data = br#"{"list": [], "extra": 1}"#;
        assert!(ImagesList::decode(data).is_err());
        let data = br#"{"images": [], "extra": 1}"#;
        assert!(UnavailableImages::decode(data).is_err());
    }
}
