//! Step document resolution, including variant bucketing.
//!
//! A document descriptor names a family of stored HTML files. When a
//! project ships several variants of one step (`step2-0.html`,
//! `step2-1.html`, ...), each user is pinned to one variant by a
//! deterministic digit-sum derivation over the tail of their identifier.
//! Variant assignments are part of recorded study data, so the
//! derivation must stay reproducible across releases; do not swap it
//! for a conventional hash.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::providers::storage::{ObjectStore, StoreError};

/// Body served when a step's document is missing from the store
pub const MISSING_CONTENT: &str = "Content Not Found";

#[derive(Debug, Error)]
pub enum StepError {
    #[error("identifier '{id}' has non-hex character '{ch}' in its tail")]
    BadIdentifier { id: String, ch: char },

    #[error("variant listing under '{prefix}' failed")]
    List {
        prefix: String,
        #[source]
        source: StoreError,
    },
}

/// How many trailing identifier digits feed the bucket sum for `n`
/// variants: the product of the distinct prime factors of `n` with the
/// smallest factor removed. An empty product is 1, so at least one
/// digit always contributes.
fn digit_span(n: usize) -> usize {
    let mut remaining = n;
    let mut factors: Vec<usize> = Vec::new();
    let mut i = 2;
    while i * i <= remaining {
        if remaining % i == 0 {
            remaining /= i;
            if factors.last() != Some(&i) {
                factors.push(i);
            }
        } else {
            i += 1;
        }
    }
    if remaining > 1 && factors.last() != Some(&remaining) {
        factors.push(remaining);
    }
    factors.iter().skip(1).product()
}

/// Deterministic bucket in `0..n` for an identifier: sum of the hex
/// values of the last `digit_span(n)` characters, reduced modulo `n`.
/// Identifiers shorter than the span contribute what they have.
pub fn bucket_index(user_id: &str, n: usize) -> Result<usize, StepError> {
    let span = digit_span(n);
    let chars: Vec<char> = user_id.chars().collect();
    let tail = &chars[chars.len().saturating_sub(span)..];

    let mut sum: usize = 0;
    for &ch in tail {
        let digit = ch.to_digit(16).ok_or_else(|| StepError::BadIdentifier {
            id: user_id.to_string(),
            ch,
        })?;
        sum += digit as usize;
    }
    Ok(sum % n)
}

/// Resolves document descriptors to storage keys and fetches their
/// content.
pub struct StepResolver {
    store: Arc<dyn ObjectStore>,
}

impl StepResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Storage key for `descriptor`, sharded across variants when the
    /// project ships more than one.
    ///
    /// Variant discovery lists the project's keys, keeps the HTML ones,
    /// and collects those containing the descriptor stem. With a single
    /// match (or none, or no variant tagged for the user's bucket) the
    /// unsharded `{project_id}/{stem}.html` key is used.
    pub async fn document_key(
        &self,
        bucket: &str,
        project_id: &str,
        user_id: &str,
        descriptor: &str,
    ) -> Result<String, StepError> {
        let keys = self
            .store
            .list(bucket, project_id)
            .await
            .map_err(|source| StepError::List {
                prefix: project_id.to_string(),
                source,
            })?;

        let stem = descriptor.strip_suffix(".html").unwrap_or(descriptor);
        let variants: Vec<&String> = keys
            .iter()
            .filter(|k| k.contains("html"))
            .filter(|k| k.contains(stem))
            .collect();

        if variants.len() > 1 {
            let bucket_tag = format!("-{}.html", bucket_index(user_id, variants.len())?);
            if let Some(chosen) = variants.iter().find(|k| k.contains(&bucket_tag)) {
                debug!(user = user_id, variant = %chosen, "assigned step variant");
                return Ok((*chosen).clone());
            }
        }
        Ok(format!("{project_id}/{stem}.html"))
    }

    /// Fetch the document for `descriptor`. Any retrieval failure is
    /// served as the `MISSING_CONTENT` body rather than an error.
    pub async fn fetch_document(
        &self,
        bucket: &str,
        project_id: &str,
        user_id: &str,
        descriptor: &str,
    ) -> Result<String, StepError> {
        let key = self
            .document_key(bucket, project_id, user_id, descriptor)
            .await?;
        match self.store.get_text(bucket, &key).await {
            Ok(content) => Ok(content),
            Err(StoreError::NotFound { .. }) => {
                debug!(%key, "step document missing");
                Ok(MISSING_CONTENT.to_string())
            }
            Err(e) => {
                warn!(%key, error = %e, "step document unreadable");
                Ok(MISSING_CONTENT.to_string())
            }
        }
    }
}
