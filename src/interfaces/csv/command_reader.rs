use crate::error::{BillingError, Result};
use crate::interfaces::command::{HostCommand, ScriptRow};
use std::io::Read;

/// Reads host commands from a CSV script.
///
/// Wraps `csv::Reader` and yields one `Result<HostCommand>` per line, so a bad
/// line can be reported without stopping the rest of the script.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    ///
    /// # Arguments
    ///
    /// * `source` - CSV script with a `command, arg, extra` header.
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and parses commands.
    pub fn commands(self) -> impl Iterator<Item = Result<HostCommand>> {
        self.reader.into_deserialize::<ScriptRow>().map(|result| {
            result
                .map_err(BillingError::from)
                .and_then(HostCommand::try_from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "command, arg, extra\npurchase, gold, tx1\nconsumeUnconsumedPurchases\nquerySkuDetails, gold|gems,";
        let reader = CommandReader::new(data.as_bytes());
        let results: Vec<Result<HostCommand>> = reader.commands().collect();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &HostCommand::Purchase {
                sku: "gold".to_string(),
                transaction_id: "tx1".to_string()
            }
        );
        assert_eq!(
            results[1].as_ref().unwrap(),
            &HostCommand::ConsumeUnconsumedPurchases
        );
        assert!(matches!(
            results[2].as_ref().unwrap(),
            HostCommand::QuerySkuDetails { skus } if skus.len() == 2
        ));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "command, arg, extra\nrefund, gold, tx1\nisConnected";
        let reader = CommandReader::new(data.as_bytes());
        let results: Vec<Result<HostCommand>> = reader.commands().collect();

        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap(), &HostCommand::IsConnected);
    }
}
