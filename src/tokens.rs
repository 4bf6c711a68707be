//! Token estimation for the AI-usage prompt.
//!
//! Uses tiktoken when the configured model has a known encoding, otherwise
//! falls back to the 4-chars-per-token estimate.

use tiktoken_rs::{CoreBPE, get_bpe_from_model};

/// Estimates the token cost of a prompt before it is sent anywhere.
pub struct TokenEstimator {
   bpe: Option<CoreBPE>,
}

impl std::fmt::Debug for TokenEstimator {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("TokenEstimator")
         .field("has_encoding", &self.bpe.is_some())
         .finish()
   }
}

impl TokenEstimator {
   /// Create an estimator for `model`. Unknown models use the char estimate.
   pub fn for_model(model: Option<&str>) -> Self {
      Self { bpe: model.and_then(|m| get_bpe_from_model(m).ok()) }
   }

   pub fn estimate(&self, text: &str) -> usize {
      match &self.bpe {
         Some(encoder) => encoder.encode_with_special_tokens(text).len(),
         None => text.len().div_ceil(4),
      }
   }
}
