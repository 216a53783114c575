use blake3::Hasher;

/// Domain-separated, length-prefixed BLAKE3 transcript.
///
/// Every field is framed as `label_len || label || data_len || data`, so two
/// different field sequences can never produce the same input stream.
pub struct Transcript {
    hasher: Hasher,
}

impl Transcript {
    /// Start a transcript for a protocol domain
    pub fn new(domain: &str) -> Self {
        let mut transcript = Self { hasher: Hasher::new() };
        transcript.append(b"domain", domain.as_bytes());
        transcript
    }

    /// Append a labelled field
    pub fn append(&mut self, label: &[u8], data: &[u8]) -> &mut Self {
        self.hasher.update(&(label.len() as u64).to_le_bytes());
        self.hasher.update(label);
        self.hasher.update(&(data.len() as u64).to_le_bytes());
        self.hasher.update(data);
        self
    }

    /// Append a labelled integer
    pub fn append_u64(&mut self, label: &[u8], value: u64) -> &mut Self {
        self.append(label, &value.to_le_bytes())
    }

    /// Append a labelled signed integer (timestamps)
    pub fn append_i64(&mut self, label: &[u8], value: i64) -> &mut Self {
        self.append(label, &value.to_le_bytes())
    }

    /// Finish and return the 32-byte digest
    pub fn finalize(&self) -> [u8; 32] {
        *self.hasher.finalize().as_bytes()
    }
}

/// Short hex fingerprint of a key, for logs and key ids
pub fn fingerprint(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hex::encode(&hash.as_bytes()[..8])
}
