//! Debug logging setup.
//!
//! `--debug` installs a stderr subscriber printing `[DEBUG] <msg> k=v ...`
//! with no timestamps and no colors; `--verbose` keeps the same format at
//! info level. Without either flag nothing is logged.

use std::fmt::{self, Write as _};

use tracing::{Event, Level, Subscriber, field::Field};
use tracing_subscriber::{
   fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
   registry::LookupSpan,
};

/// Plain `[LEVEL] message k=v` event format.
struct PlainFormat;

struct FieldCollector {
   message: Option<String>,
   fields:  Vec<(&'static str, String)>,
}

impl tracing::field::Visit for FieldCollector {
   fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
      if field.name() == "message" {
         self.message = Some(format!("{value:?}"));
      } else {
         self.fields.push((field.name(), format!("{value:?}")));
      }
   }

   fn record_str(&mut self, field: &Field, value: &str) {
      if field.name() == "message" {
         self.message = Some(value.to_string());
      } else {
         self.fields.push((field.name(), value.to_string()));
      }
   }
}

impl<S, N> FormatEvent<S, N> for PlainFormat
where
   S: Subscriber + for<'a> LookupSpan<'a>,
   N: for<'a> FormatFields<'a> + 'static,
{
   fn format_event(
      &self,
      _ctx: &FmtContext<'_, S, N>,
      mut writer: Writer<'_>,
      event: &Event<'_>,
   ) -> fmt::Result {
      let mut collector = FieldCollector { message: None, fields: Vec::new() };
      event.record(&mut collector);

      write!(writer, "[{}]", event.metadata().level())?;
      if let Some(message) = &collector.message {
         write!(writer, " {message}")?;
      }
      for (name, value) in &collector.fields {
         write!(writer, " {name}={value}")?;
      }
      writeln!(writer)
   }
}

/// Install the subscriber. A no-op unless `debug` or `verbose` is set;
/// `--verbose` is subsumed by `--debug`.
pub fn init(debug: bool, verbose: bool) {
   let level = if debug {
      Level::DEBUG
   } else if verbose {
      Level::INFO
   } else {
      return;
   };

   tracing_subscriber::fmt()
      .with_max_level(level)
      .with_writer(std::io::stderr)
      .with_ansi(false)
      .event_format(PlainFormat)
      .init();
}
