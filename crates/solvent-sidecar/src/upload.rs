//! Single-attempt upload of the result record to the solution service

use tracing::info;

use solvent_common::models::SolutionRecord;
use solvent_common::{Error, Result, SYSTEM_IDENTITY_HEADERS};

/// POST the record to the solution service's upload endpoint.
///
/// One attempt only; a failure surfaces as an error the caller logs.
pub async fn upload_record(
    client: &reqwest::Client,
    solution_service: &str,
    record: &SolutionRecord,
) -> Result<()> {
    let url = format!("http://{solution_service}/api/solutions/upload");
    let mut request = client.post(&url);
    for (name, value) in SYSTEM_IDENTITY_HEADERS {
        request = request.header(name, value);
    }

    match request.json(record).send().await {
        Ok(response) if response.status().is_success() => {
            info!(computation_id = %record.computation_id, "uploaded solve result");
            Ok(())
        }
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::remote_service(
                "solution-service",
                format!("replied {status}: {body}"),
            ))
        }
        Err(e) => Err(Error::remote_service(
            "solution-service",
            format!("request failed: {e}"),
        )),
    }
}
