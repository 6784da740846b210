//! Signature registry
//!
//! Interns method signatures so that structurally equal interfaces share one
//! `SignatureId`. Two methods with the same signature remain distinct
//! identities; the shared id only captures the wire shape and the
//! nonexclusive flag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::layout::Layout;

/// Interned signature identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureId(pub(crate) u32);

impl std::fmt::Display for SignatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sig#{}", self.0)
    }
}

/// An immutable method interface descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Input record layout
    pub input: Layout,
    /// Output record layout
    pub output: Layout,
    /// Whether simultaneous callers are merged rather than arbitrated
    pub nonexclusive: bool,
}

impl Signature {
    /// Build a signature
    pub fn new(input: Layout, output: Layout, nonexclusive: bool) -> Self {
        Self {
            input,
            output,
            nonexclusive,
        }
    }
}

/// Interning registry for signatures
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    signatures: Vec<Signature>,
    interned: HashMap<Signature, SignatureId>,
}

impl SignatureRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a signature; structurally equal signatures return the same id
    pub fn intern(&mut self, signature: Signature) -> SignatureId {
        if let Some(&id) = self.interned.get(&signature) {
            return id;
        }
        let id = SignatureId(self.signatures.len() as u32);
        self.signatures.push(signature.clone());
        self.interned.insert(signature, id);
        id
    }

    /// Look up an interned signature
    pub fn get(&self, id: SignatureId) -> &Signature {
        &self.signatures[id.0 as usize]
    }

    /// Number of distinct signatures
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// True when nothing has been interned
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
