/// Lower-cased, trimmed form used as the lookup key for accounts.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Emails to try, in order, when looking up an account.
///
/// Accounts registered before emails were normalized may be stored with their
/// original casing, so the raw form is tried after the normalized one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCandidates {
    normalized: String,
    candidates: Vec<String>,
}

impl EmailCandidates {
    /// `None` when the input is blank.
    pub fn new(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let normalized = normalize_email(raw);
        let mut candidates = vec![normalized.clone()];
        if raw != normalized {
            candidates.push(raw.to_string());
        }

        Some(Self {
            normalized,
            candidates,
        })
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn as_slice(&self) -> &[String] {
        &self.candidates
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(String::as_str)
    }
}
