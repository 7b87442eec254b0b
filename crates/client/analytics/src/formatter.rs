use console::{Style, StyledObject};
use std::{fmt, time::SystemTime};
use time::{format_description, OffsetDateTime, UtcOffset};
use tracing::{field::Visit, Level, Subscriber};
use tracing_core::Field;
use up_utils::display_fn;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

/// Alive state change of an upstream link, logged under the `upstream_state` target.
struct UpstreamStateEvent<'a> {
    pub endpoint: &'a str,
    pub role: &'a str,
    pub from: &'a str,
    pub to: &'a str,
}

#[derive(Default)]
struct UpstreamStateEventVisitor {
    endpoint: String,
    role: String,
    from: String,
    to: String,
}

impl UpstreamStateEventVisitor {
    fn field(&mut self, field: &Field) -> Option<&mut String> {
        match field.name() {
            "endpoint" => Some(&mut self.endpoint),
            "role" => Some(&mut self.role),
            "from" => Some(&mut self.from),
            "to" => Some(&mut self.to),
            _ => None,
        }
    }

    pub fn get(&self) -> Option<UpstreamStateEvent<'_>> {
        if self.endpoint.is_empty() || self.to.is_empty() {
            return None;
        }
        Some(UpstreamStateEvent { endpoint: &self.endpoint, role: &self.role, from: &self.from, to: &self.to })
    }
}

impl Visit for UpstreamStateEventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if let Some(slot) = self.field(field) {
            slot.clear();
            slot.push_str(value);
        }
    }
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if let Some(slot) = self.field(field) {
            *slot = format!("{value:?}").trim_matches('"').to_string();
        }
    }
}

/// Collects every field except the message as `name=value`.
#[derive(Default)]
struct FieldsVisitor {
    fields: Vec<(&'static str, String)>,
}

impl Visit for FieldsVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() != "message" {
            self.fields.push((field.name(), value.to_string()));
        }
    }
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() != "message" {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }
}

pub fn visit_message(event: &tracing::Event<'_>, f: impl FnOnce(&dyn fmt::Debug) -> fmt::Result) -> fmt::Result {
    struct Visitor<F>(Option<F>, fmt::Result);
    impl<F: FnOnce(&dyn fmt::Debug) -> fmt::Result> Visit for Visitor<F> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                if let Some(f) = self.0.take() {
                    self.1 = (f)(value);
                }
            }
        }
    }
    let mut visitor = Visitor(Some(f), Ok(()));
    event.record(&mut visitor);
    visitor.1
}

pub struct CustomFormatter {
    local_offset: UtcOffset,
    dim_style: Style,
    open_bracket_dim: StyledObject<&'static str>,
    closed_bracket_dim: StyledObject<&'static str>,
    ts_format: Vec<format_description::BorrowedFormatItem<'static>>,
}

impl CustomFormatter {
    pub fn new() -> Self {
        let dim_style = Style::new().dim();
        Self {
            open_bracket_dim: dim_style.apply_to("["),
            closed_bracket_dim: dim_style.apply_to("]"),
            local_offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            dim_style,
            ts_format: format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]:[subsecond digits:3]")
                .expect("Invalid date format constant"),
        }
    }

    fn timestamp_fmt<'a>(&'a self, ts: &'a SystemTime) -> impl fmt::Display + 'a {
        display_fn(|f| {
            let datetime: OffsetDateTime = (*ts).into();
            let local_datetime = datetime.to_offset(self.local_offset);
            match local_datetime.format(&self.ts_format) {
                Ok(ts) => {
                    write!(f, "{}{}{}", self.open_bracket_dim, self.dim_style.apply_to(ts), self.closed_bracket_dim)
                }
                Err(_) => {
                    write!(f, "<error>")
                }
            }
        })
    }

    fn fields_fmt<'a>(&'a self, fields: &'a FieldsVisitor) -> impl fmt::Display + 'a {
        display_fn(move |f| {
            for (name, value) in &fields.fields {
                write!(f, " {}", self.dim_style.apply_to(format_args!("{name}={value}")))?;
            }
            Ok(())
        })
    }

    fn format_without_target(
        &self,
        writer: &mut Writer<'_>,
        event: &tracing::Event<'_>,
        ts: &SystemTime,
        level: &Level,
        level_style: &Style,
    ) -> fmt::Result {
        let mut fields = FieldsVisitor::default();
        event.record(&mut fields);
        visit_message(event, |message| {
            writeln!(
                writer,
                "{} {} {:?}{}",
                self.timestamp_fmt(ts),
                level_style.apply_to(level),
                message,
                self.fields_fmt(&fields)
            )
        })
    }

    fn format_with_target(
        &self,
        writer: &mut Writer<'_>,
        event: &tracing::Event<'_>,
        target: &str,
        ts: &SystemTime,
        level: &Level,
        level_style: &Style,
    ) -> fmt::Result {
        let mut fields = FieldsVisitor::default();
        event.record(&mut fields);
        visit_message(event, |message| {
            writeln!(
                writer,
                "{} {} {} {:?}{}",
                self.timestamp_fmt(ts),
                level_style.apply_to(level),
                self.dim_style.apply_to(target),
                message,
                self.fields_fmt(&fields)
            )
        })
    }

    fn format_upstream_state(
        &self,
        writer: &mut Writer<'_>,
        event: &tracing::Event<'_>,
        target: &str,
        ts: &SystemTime,
        level: &Level,
    ) -> fmt::Result {
        let mut visitor = UpstreamStateEventVisitor::default();
        event.record(&mut visitor);
        let Some(state) = visitor.get() else {
            // Fallback to normal formatter.
            return self.format_with_target(writer, event, target, ts, level, &Style::new().green());
        };

        let to_style = match state.to {
            "alive" => Style::new().green(),
            "dead" => Style::new().red(),
            _ => Style::new().yellow(),
        };

        writeln!(
            writer,
            "{} {} {} {} {} → {}",
            self.timestamp_fmt(ts),
            Style::new().magenta().apply_to("UPSTREAM"),
            state.endpoint,
            self.dim_style.apply_to(state.role),
            self.dim_style.apply_to(state.from),
            to_style.apply_to(state.to),
        )
    }
}

impl<S, N> FormatEvent<S, N> for CustomFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let ts = SystemTime::now();

        let metadata = event.metadata();
        let level = metadata.level();
        let target = metadata.target();

        match (level, target) {
            (_, "upstream_state") => self.format_upstream_state(&mut writer, event, target, &ts, level),
            (&Level::INFO, _) => self.format_without_target(&mut writer, event, &ts, level, &Style::new().green()),
            (&Level::WARN, _) => {
                self.format_with_target(&mut writer, event, target, &ts, level, &Style::new().yellow())
            }
            (&Level::ERROR, _) => self.format_with_target(&mut writer, event, target, &ts, level, &Style::new().red()),
            (&Level::DEBUG, _) => self.format_with_target(&mut writer, event, target, &ts, level, &Style::new().blue()),
            (&Level::TRACE, _) => self.format_with_target(&mut writer, event, target, &ts, level, &Style::new().cyan()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("Poisoned lock").extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        console::set_colors_enabled(false);
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().event_format(CustomFormatter::new()).with_writer(buffer.clone()));
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().expect("Poisoned lock").clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_upstream_state_line() {
        let out = capture(|| {
            tracing::info!(
                target: "upstream_state",
                endpoint = "wss://xrplcluster.com",
                role = %"currentledger",
                from = %"unknown",
                to = %"alive",
                "Upstream is alive"
            );
        });
        assert!(out.contains("UPSTREAM wss://xrplcluster.com currentledger unknown → alive"), "{out}");
    }

    #[test]
    fn test_info_line_carries_fields() {
        let out = capture(|| tracing::info!(endpoint = "wss://xrplcluster.com", attempt = 3, "🔄 Reconnecting"));
        assert!(out.contains("INFO \"🔄 Reconnecting\"") || out.contains("INFO 🔄 Reconnecting"), "{out}");
        assert!(out.contains("endpoint=wss://xrplcluster.com"), "{out}");
        assert!(out.contains("attempt=3"), "{out}");
    }
}
