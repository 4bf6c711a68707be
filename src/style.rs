//! Terminal styling helpers.
//!
//! Respects `NO_COLOR` and terminal capabilities. All output is inline; no
//! alternate screen.

use std::{
   io::{self, IsTerminal, Write},
   sync::{OnceLock, mpsc},
   thread,
   time::{Duration, Instant},
};

use owo_colors::OwoColorize;

static COLOR_ENABLED: OnceLock<bool> = OnceLock::new();

/// Check if colors should be used (cached on first call).
pub fn colors_enabled() -> bool {
   *COLOR_ENABLED.get_or_init(|| {
      // NO_COLOR takes precedence (https://no-color.org/)
      if std::env::var("NO_COLOR").is_ok() {
         return false;
      }
      supports_color::on(supports_color::Stream::Stdout).is_some_and(|level| level.has_basic)
   })
}

pub mod icons {
   pub const SUCCESS: &str = "\u{2713}";
   pub const WARNING: &str = "\u{26A0}";
   pub const ERROR: &str = "\u{2717}";
}

/// Success: checkmarks, completed actions (green + bold).
pub fn success(s: &str) -> String {
   if colors_enabled() {
      s.green().bold().to_string()
   } else {
      s.to_string()
   }
}

/// Warning: advisory validation issues, unsigned fallback (yellow).
pub fn warning(s: &str) -> String {
   if colors_enabled() {
      s.yellow().to_string()
   } else {
      s.to_string()
   }
}

/// Error: failures (red + bold).
pub fn error(s: &str) -> String {
   if colors_enabled() {
      s.red().bold().to_string()
   } else {
      s.to_string()
   }
}

/// Dim: file paths, secondary detail.
pub fn dim(s: &str) -> String {
   if colors_enabled() {
      s.dimmed().to_string()
   } else {
      s.to_string()
   }
}

pub fn bold(s: &str) -> String {
   if colors_enabled() {
      s.bold().to_string()
   } else {
      s.to_string()
   }
}

/// Print a warning line to stderr with its icon.
pub fn warn(msg: &str) {
   eprintln!("{} {}", warning(icons::WARNING), warning(msg));
}

/// Get terminal width, capped at 120 columns.
pub fn term_width() -> usize {
   terminal_size::terminal_size()
      .map_or(80, |(w, _)| w.0 as usize)
      .min(120)
}

// === Message preview ===

const RULE: char = '\u{2500}';
const GUTTER: char = '\u{2502}';

/// Render a titled preview with a left gutter:
///
/// ```text
/// ── Proposed commit ──────────
/// │ chore: init
/// │
/// │ Signed-off-by: Ada <ada@x>
/// ─────────────────────────────
/// ```
///
/// There is no right border, so content only needs wrapping, not padding.
pub fn framed_message(title: &str, content: &str, width: usize) -> String {
   let width = width.max(title.chars().count() + 6);
   let mut out = String::new();

   let tail = width.saturating_sub(title.chars().count() + 4);
   out.push(RULE);
   out.push(RULE);
   out.push(' ');
   out.push_str(&bold(title));
   out.push(' ');
   out.push_str(&dim(&RULE.to_string().repeat(tail)));
   out.push('\n');

   let body_width = width.saturating_sub(2);
   for line in content.lines() {
      for piece in wrap(line, body_width) {
         out.push_str(&dim(&GUTTER.to_string()));
         if !piece.is_empty() {
            out.push(' ');
            out.push_str(&piece);
         }
         out.push('\n');
      }
   }

   out.push_str(&dim(&RULE.to_string().repeat(width)));
   out
}

/// Word-wrap a single line to `width` columns. Words longer than a whole
/// line are hard-broken rather than overflowing.
fn wrap(line: &str, width: usize) -> Vec<String> {
   let width = width.max(1);
   if line.trim().is_empty() {
      return vec![String::new()];
   }

   let mut lines = Vec::new();
   let mut current = String::new();
   let mut used = 0usize;

   for word in line.split_whitespace() {
      let mut word = word;

      // Hard-break anything that cannot fit on a line of its own
      while word.chars().count() > width {
         if used > 0 {
            lines.push(std::mem::take(&mut current));
            used = 0;
         }
         let head: String = word.chars().take(width).collect();
         word = &word[head.len()..];
         lines.push(head);
      }
      if word.is_empty() {
         continue;
      }

      let need = word.chars().count() + usize::from(used > 0);
      if used + need > width && used > 0 {
         lines.push(std::mem::take(&mut current));
         used = 0;
      }
      if used > 0 {
         current.push(' ');
         used += 1;
      }
      current.push_str(word);
      used += word.chars().count();
   }

   if used > 0 {
      lines.push(current);
   }
   lines
}

// === Spinner ===

const SPINNER_FRAMES: &[&str] = &["|", "/", "-", "\\"];
const FRAME_INTERVAL: Duration = Duration::from_millis(90);

/// Run `f` with a spinner on stderr. Falls back to a static line when
/// stderr is not a terminal or colors are off.
pub fn with_spinner<F, T>(message: &str, f: F) -> T
where
   F: FnOnce() -> T,
{
   if !io::stderr().is_terminal() || !colors_enabled() {
      eprintln!("{message}");
      return f();
   }

   let (done_tx, done_rx) = mpsc::channel::<()>();
   let msg = message.to_string();

   let ticker = thread::spawn(move || {
      let started = Instant::now();
      loop {
         let tick = (started.elapsed().as_millis() / FRAME_INTERVAL.as_millis()) as usize;
         let frame = SPINNER_FRAMES[tick % SPINNER_FRAMES.len()];
         eprint!("\r{} {}", frame.cyan(), msg);
         io::stderr().flush().ok();

         // The channel doubles as the frame clock and the stop signal
         match done_rx.recv_timeout(FRAME_INTERVAL) {
            Err(mpsc::RecvTimeoutError::Timeout) => {},
            _ => break,
         }
      }
      eprint!("\r\x1b[K");
      io::stderr().flush().ok();
   });

   let result = f();
   done_tx.send(()).ok();
   ticker.join().ok();
   result
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_wrap_preserves_words() {
      assert_eq!(wrap("one two three four", 9), vec!["one two", "three", "four"]);
   }

   #[test]
   fn test_wrap_blank_line_kept() {
      assert_eq!(wrap("", 10), vec![String::new()]);
      assert_eq!(wrap("   ", 10), vec![String::new()]);
   }

   #[test]
   fn test_wrap_hard_breaks_long_words() {
      assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
      assert_eq!(wrap("xy abcdefgh z", 5), vec!["xy", "abcde", "fgh z"]);
   }

   #[test]
   fn test_framed_message_shape() {
      let rendered = framed_message("Commit", "chore: init\n\nSigned-off-by: Ada <ada@x>", 40);
      let lines: Vec<&str> = rendered.lines().collect();

      assert!(lines[0].contains("Commit"));
      assert!(lines[0].starts_with("\u{2500}\u{2500} "));
      // Body lines carry the gutter; the blank one has no trailing padding
      assert_eq!(lines[1], "\u{2502} chore: init");
      assert_eq!(lines[2], "\u{2502}");
      assert!(lines[3].contains("Signed-off-by"));
      // Bottom rule is plain
      assert!(lines[4].chars().all(|c| c == '\u{2500}'));
   }

   #[test]
   fn test_framed_message_wraps_body() {
      let long = "word ".repeat(20);
      let rendered = framed_message("T", long.trim(), 24);
      for line in rendered.lines().skip(1) {
         assert!(line.chars().count() <= 24);
      }
   }
}
