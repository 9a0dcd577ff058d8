use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::config::NextcloudConfig;
use crate::errors::AdapterError;
use crate::models::{FileOperation, Operation, OutputRecord, Record};
use crate::params::ParameterSource;
use crate::request::build_request;
use crate::response::{normalize, Normalized};
use crate::transport::{HttpTransport, Transport};

/// Drives a batch of input records through one operation, strictly
/// sequentially: the request for record i+1 is not issued before record i
/// has been normalized.
pub struct Executor {
    config: NextcloudConfig,
    transport: Arc<dyn Transport>,
    continue_on_fail: bool,
}

impl Executor {
    pub fn new(config: NextcloudConfig) -> Result<Self, AdapterError> {
        let transport = Arc::new(HttpTransport::new(config.clone())?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: NextcloudConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            continue_on_fail: false,
        }
    }

    /// With error tolerance enabled a failing record becomes an error
    /// record in the output and the batch keeps going; without it the
    /// first failure aborts the batch.
    pub fn continue_on_fail(mut self, enabled: bool) -> Self {
        self.continue_on_fail = enabled;
        self
    }

    pub async fn execute(
        &self,
        op: &Operation,
        items: &[Record],
        params: &dyn ParameterSource,
    ) -> Result<Vec<OutputRecord>, AdapterError> {
        let is_download = matches!(op, Operation::File(FileOperation::Download));
        let mut items: Vec<Record> = items.to_vec();
        let mut output: Vec<OutputRecord> = Vec::new();

        info!(operation = %op, records = items.len(), "executing batch");

        for i in 0..items.len() {
            match self.run_item(op, i, &items[i], params).await {
                // Downloads replace the originating record in place
                Ok(Normalized::Merged(record)) => items[i] = record,
                Ok(Normalized::Records(mut records)) => output.append(&mut records),
                Err(err) if self.continue_on_fail => {
                    debug!(item = i, error = %err, "record failed, continuing");
                    if is_download {
                        items[i].json = json!({ "error": err.to_string() });
                    } else {
                        output.push(OutputRecord::json_only(
                            json!({ "error": err.to_string() }),
                            i,
                        ));
                    }
                }
                Err(err) => return Err(err),
            }
        }

        if is_download {
            Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, record)| OutputRecord {
                    json: record.json,
                    binary: record.binary,
                    paired_item: i,
                })
                .collect())
        } else {
            Ok(output)
        }
    }

    async fn run_item(
        &self,
        op: &Operation,
        item: usize,
        record: &Record,
        params: &dyn ParameterSource,
    ) -> Result<Normalized, AdapterError> {
        let envelope = build_request(op, item, params, record, &self.config)?;
        debug!(method = %envelope.method, url = %envelope.url, item, "sending request");
        let raw = self.transport.send(&envelope).await?;
        normalize(op, item, raw, record, params, &self.config)
    }
}
