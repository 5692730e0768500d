use crate::domain::event::DeliveredEvent;
use crate::error::Result;
use serde_json::{Value, json};
use std::io::Write;

/// Writes the session transcript as JSON lines.
pub struct EventWriter<W: Write> {
    writer: W,
}

impl<W: Write> EventWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Records the value returned by a synchronous host call.
    pub fn write_result(&mut self, method: &str, value: Value) -> Result<()> {
        self.write_line(&json!({ "method": method, "value": value }))
    }

    pub fn write_event(&mut self, delivered: &DeliveredEvent) -> Result<()> {
        let line = json!({
            "callback_id": delivered.target,
            "event": delivered.event.name(),
            "args": delivered.event.args()?,
        });
        self.write_line(&line)
    }

    pub fn write_events<I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = DeliveredEvent>,
    {
        for delivered in events {
            self.write_event(&delivered)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn write_line(&mut self, line: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        writeln!(self.writer)?;
        Ok(())
    }
}
