//! Parsing of `git diff --cached --unified=0` output.
//!
//! The raw diff is split on `diff --git` boundaries and each chunk is
//! associated with its (post-rename) path. Binary files keep an empty diff;
//! per-file diffs over the size cap are replaced with a short metadata block
//! so prompts stay bounded.

/// Per-file diffs larger than this are replaced by a metadata block.
pub const MAX_DIFF_CHARS: usize = 5000;

/// One file's chunk of a cached diff.
#[derive(Debug, Clone)]
pub struct DiffEntry {
   pub path:      String,
   /// Pre-rename path when the chunk carries `rename from`/`rename to`
   pub old_path:  Option<String>,
   pub text:      String,
   pub is_binary: bool,
}

impl DiffEntry {
   /// Diff text as attached to a `FileChange`: empty for binary files, a
   /// metadata block when oversize, the raw chunk otherwise.
   pub fn attached_text(&self) -> String {
      if self.is_binary {
         return String::new();
      }
      if self.text.len() > MAX_DIFF_CHARS {
         return oversize_block(self.text.len(), self.text.lines().count(), false);
      }
      self.text.clone()
   }
}

/// Metadata block replacing an oversize diff: size, line count, binary flag.
pub fn oversize_block(chars: usize, lines: usize, binary: bool) -> String {
   if binary {
      format!("[diff omitted: {chars} chars, {lines} lines, binary]")
   } else {
      format!("[diff omitted: {chars} chars, {lines} lines]")
   }
}

/// Split raw `git diff --cached` output into per-file entries.
pub fn split_cached_diff(raw: &str) -> Vec<DiffEntry> {
   let mut entries = Vec::new();
   let mut current: Option<ChunkBuilder> = None;

   for line in raw.lines() {
      if let Some(header_paths) = line.strip_prefix("diff --git ") {
         if let Some(builder) = current.take() {
            entries.push(builder.finish());
         }
         current = Some(ChunkBuilder::new(header_paths, line));
         continue;
      }

      let Some(builder) = current.as_mut() else {
         // Preamble before the first file header (shouldn't happen for
         // --cached output); skip it.
         continue;
      };
      builder.push_line(line);
   }

   if let Some(builder) = current.take() {
      entries.push(builder.finish());
   }
   entries
}

struct ChunkBuilder {
   header_path: String,
   rename_from: Option<String>,
   rename_to:   Option<String>,
   plus_path:   Option<String>,
   is_binary:   bool,
   text:        String,
}

impl ChunkBuilder {
   fn new(header_paths: &str, header_line: &str) -> Self {
      Self {
         header_path: parse_header_path(header_paths),
         rename_from: None,
         rename_to:   None,
         plus_path:   None,
         is_binary:   false,
         text:        format!("{header_line}\n"),
      }
   }

   fn push_line(&mut self, line: &str) {
      if let Some(from) = line.strip_prefix("rename from ") {
         self.rename_from = Some(from.to_string());
      } else if let Some(to) = line.strip_prefix("rename to ") {
         self.rename_to = Some(to.to_string());
      } else if let Some(to) = line.strip_prefix("copy to ") {
         self.rename_to = Some(to.to_string());
      } else if let Some(rest) = line.strip_prefix("+++ b/") {
         self.plus_path = Some(rest.to_string());
      } else if line.starts_with("Binary files ") && line.ends_with(" differ") {
         self.is_binary = true;
      }
      self.text.push_str(line);
      self.text.push('\n');
   }

   fn finish(self) -> DiffEntry {
      // Rename/copy target wins, then the +++ path, then the header guess
      let path = self
         .rename_to
         .clone()
         .or(self.plus_path)
         .unwrap_or(self.header_path);
      DiffEntry { path, old_path: self.rename_from, text: self.text, is_binary: self.is_binary }
   }
}

/// Extract the b-side path from a `diff --git a/... b/...` header.
///
/// Paths with spaces are handled by splitting on the last ` b/` marker;
/// quoted paths (unusual characters) keep their quotes stripped.
fn parse_header_path(header_paths: &str) -> String {
   let path = match header_paths.rfind(" b/") {
      Some(idx) => &header_paths[idx + 3..],
      None => header_paths,
   };
   path.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
   use super::*;

   const TWO_FILE_DIFF: &str = "\
diff --git a/src/api.rs b/src/api.rs
index 1111111..2222222 100644
--- a/src/api.rs
+++ b/src/api.rs
@@ -10,0 +11,1 @@
+fn new_endpoint() {}
diff --git a/README.md b/README.md
index 3333333..4444444 100644
--- a/README.md
+++ b/README.md
@@ -1,1 +1,1 @@
-old title
+new title
";

   #[test]
   fn test_split_two_files() {
      let entries = split_cached_diff(TWO_FILE_DIFF);
      assert_eq!(entries.len(), 2);
      assert_eq!(entries[0].path, "src/api.rs");
      assert!(entries[0].text.contains("+fn new_endpoint() {}"));
      assert_eq!(entries[1].path, "README.md");
      assert!(entries[1].text.contains("+new title"));
   }

   #[test]
   fn test_rename_recognized() {
      let raw = "\
diff --git a/src/old.rs b/src/new.rs
similarity index 97%
rename from src/old.rs
rename to src/new.rs
index 1111111..2222222 100644
--- a/src/old.rs
+++ b/src/new.rs
@@ -1,1 +1,1 @@
-a
+b
";
      let entries = split_cached_diff(raw);
      assert_eq!(entries.len(), 1);
      assert_eq!(entries[0].path, "src/new.rs");
      assert_eq!(entries[0].old_path.as_deref(), Some("src/old.rs"));
   }

   #[test]
   fn test_binary_marker() {
      let raw = "\
diff --git a/logo.png b/logo.png
index 1111111..2222222 100644
Binary files a/logo.png and b/logo.png differ
";
      let entries = split_cached_diff(raw);
      assert_eq!(entries.len(), 1);
      assert!(entries[0].is_binary);
      assert_eq!(entries[0].attached_text(), "");
   }

   #[test]
   fn test_oversize_replaced_with_metadata() {
      let mut raw = String::from("diff --git a/big.rs b/big.rs\n+++ b/big.rs\n");
      for i in 0..400 {
         raw.push_str(&format!("+line number {i} with some padding text\n"));
      }
      let entries = split_cached_diff(&raw);
      assert_eq!(entries.len(), 1);
      assert!(entries[0].text.len() > MAX_DIFF_CHARS);

      let attached = entries[0].attached_text();
      assert!(attached.starts_with("[diff omitted:"));
      assert!(attached.contains("chars"));
      assert!(attached.contains("lines"));
   }

   #[test]
   fn test_boundary_5000_chars_kept() {
      // Exactly at the cap the diff is kept verbatim; one past it is replaced.
      let entry = DiffEntry {
         path:      "x".to_string(),
         old_path:  None,
         text:      "x".repeat(MAX_DIFF_CHARS),
         is_binary: false,
      };
      assert_eq!(entry.attached_text().len(), MAX_DIFF_CHARS);

      let over = DiffEntry { text: "x".repeat(MAX_DIFF_CHARS + 1), ..entry };
      assert!(over.attached_text().starts_with("[diff omitted: 5001 chars"));
   }

   #[test]
   fn test_header_path_with_spaces() {
      assert_eq!(parse_header_path("a/has space.txt b/has space.txt"), "has space.txt");
      assert_eq!(parse_header_path("a/simple.rs b/simple.rs"), "simple.rs");
   }
}
