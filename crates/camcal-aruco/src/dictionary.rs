//! Dictionary metadata and packed marker codes.

use crate::matcher::rotate_code_u64;
use camcal_core::DictionaryId;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors raised while loading, generating or resolving a dictionary.
#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("marker_size {0} is unsupported (1..=8 bits per side)")]
    UnsupportedMarkerSize(usize),
    #[error("dictionary '{name}': code #{index} has bits beyond {bits}")]
    CodeOutOfRange {
        name: String,
        index: usize,
        bits: usize,
    },
    #[error("code table for {0} must be supplied with a dictionary file")]
    TableRequired(String),
    #[error("dictionary file holds '{found}', expected '{expected}'")]
    NameMismatch { expected: String, found: String },
    #[error("dictionary '{name}' has {found} codes, {required} required")]
    TooFewCodes {
        name: String,
        found: usize,
        required: usize,
    },
    #[error(
        "could only generate {generated} of {requested} codes with minimum distance {min_distance}"
    )]
    GenerationExhausted {
        requested: usize,
        generated: usize,
        min_distance: u8,
    },
}

/// An ArUco-style dictionary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    /// Human-readable name (for logging).
    pub name: String,
    /// Marker side length (number of inner bits per side).
    pub marker_size: usize,
    /// Maximum error-correcting Hamming distance supported by the dictionary.
    #[serde(default)]
    pub max_correction_bits: u8,
    /// One `u64` per marker id, encoding the inner `marker_size × marker_size` bits.
    ///
    /// Bits are stored in row-major order with **black = 1**.
    pub codes: Vec<u64>,
}

impl Dictionary {
    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, id: u32) -> Option<u64> {
        self.codes.get(id as usize).copied()
    }

    pub fn from_json_str(s: &str) -> Result<Self, DictionaryError> {
        let dict: Self = serde_json::from_str(s)?;
        dict.validate()?;
        Ok(dict)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DictionaryError> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), DictionaryError> {
        if self.marker_size == 0 || self.marker_size > 8 {
            return Err(DictionaryError::UnsupportedMarkerSize(self.marker_size));
        }
        let mask = bit_mask(self.bit_count());
        if let Some(index) = self.codes.iter().position(|&c| c & !mask != 0) {
            return Err(DictionaryError::CodeOutOfRange {
                name: self.name.clone(),
                index,
                bits: self.bit_count(),
            });
        }
        Ok(())
    }

    /// Deterministically generate a dictionary of `markers` codes.
    ///
    /// Every pair of codes is at least `min_distance` bits apart under all
    /// four rotations, each code differs from its own rotations by at least
    /// `min_distance`, and codes with fewer than a quarter or more than three
    /// quarters of their bits set are rejected. The same arguments always
    /// yield the same codes. These are not OpenCV's tables.
    pub fn generate(
        marker_size: usize,
        markers: usize,
        min_distance: u8,
    ) -> Result<Self, DictionaryError> {
        if marker_size == 0 || marker_size > 8 {
            return Err(DictionaryError::UnsupportedMarkerSize(marker_size));
        }
        let bits = marker_size * marker_size;
        let mask = bit_mask(bits);
        let (min_pop, max_pop) = (bits / 4, 3 * bits / 4);
        let min_distance_u32 = min_distance as u32;

        let mut rng = ChaCha8Rng::seed_from_u64(
            0x9E37_79B9_7F4A_7C15
                ^ ((marker_size as u64) << 56)
                ^ ((markers as u64) << 16)
                ^ min_distance as u64,
        );
        let max_attempts = 200_000 + markers * 2_000;
        let mut accepted: Vec<[u64; 4]> = Vec::with_capacity(markers);

        for _ in 0..max_attempts {
            if accepted.len() == markers {
                break;
            }
            let candidate = rng.next_u64() & mask;
            let pop = candidate.count_ones() as usize;
            if pop < min_pop || pop > max_pop {
                continue;
            }
            let rots = [0u8, 1, 2, 3].map(|r| rotate_code_u64(candidate, marker_size, r));
            let self_distance = rots[1..]
                .iter()
                .map(|&r| (r ^ candidate).count_ones())
                .min()
                .unwrap_or(0);
            if self_distance < min_distance_u32 {
                continue;
            }
            let far_enough = accepted.iter().all(|other| {
                other
                    .iter()
                    .all(|&o| (o ^ candidate).count_ones() >= min_distance_u32)
            });
            if far_enough {
                accepted.push(rots);
            }
        }

        if accepted.len() < markers {
            return Err(DictionaryError::GenerationExhausted {
                requested: markers,
                generated: accepted.len(),
                min_distance,
            });
        }

        let name = DictionaryId::Generated {
            marker_size,
            markers,
            min_distance,
        }
        .name();
        log::debug!("generated dictionary {name}");
        Ok(Self {
            name,
            marker_size,
            max_correction_bits: min_distance.saturating_sub(1) / 2,
            codes: accepted.into_iter().map(|r| r[0]).collect(),
        })
    }

    /// Materialise the dictionary named by `id`.
    ///
    /// Generated ids are built in-process. Predefined ids need their code
    /// table in `table_path`; extra codes in the file are ignored.
    pub fn resolve(id: DictionaryId, table_path: Option<&Path>) -> Result<Self, DictionaryError> {
        if let DictionaryId::Generated {
            marker_size,
            markers,
            min_distance,
        } = id
        {
            return Self::generate(marker_size, markers, min_distance);
        }

        let expected = id.name();
        let path = table_path.ok_or_else(|| DictionaryError::TableRequired(expected.clone()))?;
        let mut dict = Self::load_json(path)?;
        if !dict.name.eq_ignore_ascii_case(&expected) || dict.marker_size != id.marker_size() {
            return Err(DictionaryError::NameMismatch {
                expected,
                found: dict.name,
            });
        }
        let (_, required) = id.shape();
        if dict.codes.len() < required {
            return Err(DictionaryError::TooFewCodes {
                name: dict.name,
                found: dict.codes.len(),
                required,
            });
        }
        dict.codes.truncate(required);
        Ok(dict)
    }
}

#[inline]
fn bit_mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
