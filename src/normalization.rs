//! ASCII normalization of AI provider output.
//!
//! Models like to decorate prose with smart quotes, long dashes, and
//! zero-width characters; commit messages should carry none of that. Applied
//! to provider responses before parsing.

use unicode_normalization::UnicodeNormalization;

/// Normalize the character classes that show up in AI prose to plain ASCII.
pub fn normalize_ai_text(text: &str) -> String {
   let normalized: String = text.nfkd().collect();

   normalized
      // Smart quotes to straight quotes
      .replace(['\u{2018}', '\u{2019}', '\u{201A}'], "'")
      .replace(['\u{201C}', '\u{201D}', '\u{201E}'], "\"")
      // Dashes and hyphens
      .replace(['\u{2010}', '\u{2011}', '\u{2012}', '\u{2212}'], "-")
      .replace(['\u{2013}', '\u{2014}', '\u{2015}'], "--")
      // Arrows
      .replace('\u{2192}', "->")
      .replace('\u{2190}', "<-")
      .replace('\u{21D2}', "=>")
      // Ellipsis
      .replace('\u{2026}', "...")
      // Bullets to hyphens
      .replace(['\u{2022}', '\u{25E6}', '\u{25AA}'], "-")
      // Special spaces to regular space
      .replace(
         ['\u{00A0}', '\u{2002}', '\u{2003}', '\u{2009}', '\u{202F}', '\u{3000}'],
         " ",
      )
      // Zero-width characters (remove)
      .replace(['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'], "")
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_smart_quotes() {
      assert_eq!(normalize_ai_text("\u{2018}fix\u{2019} the \u{201C}bug\u{201D}"), "'fix' the \"bug\"");
   }

   #[test]
   fn test_dashes_and_arrows() {
      assert_eq!(normalize_ai_text("a\u{2014}b"), "a--b");
      assert_eq!(normalize_ai_text("x \u{2192} y"), "x -> y");
   }

   #[test]
   fn test_zero_width_removed() {
      assert_eq!(normalize_ai_text("fe\u{200B}at: x"), "feat: x");
   }

   #[test]
   fn test_plain_ascii_unchanged() {
      let text = "feat(api): add endpoint\n\nPlain body.";
      assert_eq!(normalize_ai_text(text), text);
   }
}
