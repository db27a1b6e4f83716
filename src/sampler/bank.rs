// Instrument bank - Accompaniment instruments by id, with a synth fallback

use crate::sampler::loader::{Sample, load_sample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Instrument as the renderer sees it
#[derive(Debug, Clone, PartialEq)]
pub enum Instrument {
    /// Built-in oscillator voice
    Synth,
    Sampled(Arc<Sample>),
}

impl Instrument {
    pub fn is_sampled(&self) -> bool {
        matches!(self, Instrument::Sampled(_))
    }
}

/// Configured instrument: a sample file and the note it was recorded at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub id: String,
    pub path: PathBuf,
    #[serde(default = "default_root_note")]
    pub root_note: u8,
}

fn default_root_note() -> u8 {
    60
}

/// Loaded instruments. Unknown ids and failed loads resolve to `Instrument::Synth`.
#[derive(Debug, Clone, Default)]
pub struct InstrumentBank {
    instruments: HashMap<String, Instrument>,
}

impl InstrumentBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every spec; a file that fails to load is registered as the synth
    pub fn load(specs: &[InstrumentSpec]) -> Self {
        let mut bank = Self::new();
        for spec in specs {
            let instrument = match load_sample(&spec.path, spec.root_note) {
                Ok(sample) => {
                    log::info!("Instrument '{}' loaded from {}", spec.id, spec.path.display());
                    Instrument::Sampled(Arc::new(sample))
                }
                Err(e) => {
                    log::warn!(
                        "Instrument '{}' unavailable ({}), using synth fallback",
                        spec.id,
                        e
                    );
                    Instrument::Synth
                }
            };
            bank.insert(spec.id.clone(), instrument);
        }
        bank
    }

    pub fn insert(&mut self, id: impl Into<String>, instrument: Instrument) {
        self.instruments.insert(id.into(), instrument);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instruments.contains_key(id)
    }

    pub fn resolve(&self, id: &str) -> Instrument {
        self.instruments.get(id).cloned().unwrap_or(Instrument::Synth)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.instruments.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
