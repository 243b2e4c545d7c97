use serde_json::Value;
use tracing::{error, info};

use crate::transport::ApiResponse;

/// Result of sending a record list in consecutive chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed { chunks: usize },
    Rejected { chunk: usize, total: usize, body: String },
    PayloadTooLarge { chunk: usize, total: usize },
    Failed { chunk: usize, total: usize, status: u16 },
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, UploadOutcome::Completed { .. })
    }
}

/// Number of chunks needed for `records` records.
pub fn chunk_count(records: usize, chunk_size: usize) -> usize {
    records.div_ceil(chunk_size.max(1))
}

/// Send `records` through `send` in order, `chunk_size` at a time.
///
/// Stops at the first chunk that is not answered with 201. Chunk numbers in
/// the outcome are 1-based.
pub fn upload_in_chunks<F, E>(
    label: &str,
    records: &[Value],
    chunk_size: usize,
    mut send: F,
) -> Result<UploadOutcome, E>
where
    F: FnMut(&[Value]) -> Result<ApiResponse, E>,
{
    let chunk_size = chunk_size.max(1);
    let total = chunk_count(records.len(), chunk_size);

    for (index, chunk) in records.chunks(chunk_size).enumerate() {
        let number = index + 1;
        let response = send(chunk)?;
        match response.status {
            201 => info!("{label}: Part {number}/{total} uploaded successfully."),
            400 => {
                error!("{label}: Part {number}/{total} rejected: {}", response.describe());
                return Ok(UploadOutcome::Rejected {
                    chunk: number,
                    total,
                    body: response.body,
                });
            }
            413 => {
                error!("{label}: Payload too large. Consider reducing the chunk size.");
                return Ok(UploadOutcome::PayloadTooLarge {
                    chunk: number,
                    total,
                });
            }
            status => {
                error!("{label}: Failed to upload part {number}/{total}. Status code: {status}");
                return Ok(UploadOutcome::Failed {
                    chunk: number,
                    total,
                    status,
                });
            }
        }
    }

    Ok(UploadOutcome::Completed { chunks: total })
}
