use crate::envelope::Envelope;
use crate::error::Error;
use crate::types::{BatchResult, LeadImportFailure, LeadImportResponse};
use crate::MarketoClient;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use std::collections::HashMap;

const CREATE_LEAD_IMPORT: &str = "create lead import";
const GET_LEAD_IMPORT: &str = "get lead import";
const GET_LEAD_IMPORT_FAILURES: &str = "get lead import failures";
const GET_LEAD_IMPORT_WARNINGS: &str = "get lead import warnings";

const BULK_LEADS: &str = "/bulk/v1/leads";

impl LeadImportResponse {
    fn from_envelope(envelope: &Envelope) -> Result<Self, Error> {
        let result: Option<Vec<BatchResult>> = envelope.result()?;
        Ok(Self {
            request_id: envelope.request_id.clone(),
            success: envelope.success,
            result: result.unwrap_or_default(),
        })
    }
}

impl MarketoClient {
    /// Uploads a CSV file of leads, starting an asynchronous import.
    ///
    /// The multipart body cannot be replayed, so this call is never resent.
    ///
    /// # Errors
    /// Returns [`Error::Api`] for soft errors such as 1016 (too many imports),
    /// or an error if the request fails or the response cannot be parsed.
    pub async fn create_lead_import(
        &self,
        csv: impl Into<Vec<u8>>,
    ) -> Result<LeadImportResponse, Error> {
        let part = Part::bytes(csv.into())
            .file_name("lead.csv")
            .mime_str("text/csv")?;
        let request = self
            .request(Method::POST, &format!("{BULK_LEADS}.json"))
            .query(&[("format", "csv")])
            .multipart(Form::new().part("file", part));

        let response = self.send_raw(request).await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(Error::from_status(CREATE_LEAD_IMPORT, status, &body));
        }
        let envelope = Envelope::decode(&body)?.into_result()?;
        LeadImportResponse::from_envelope(&envelope)
    }

    /// Retrieves the state of an import batch.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn get_lead_import(&self, batch_id: i64) -> Result<LeadImportResponse, Error> {
        let request = self.request(Method::GET, &format!("{BULK_LEADS}/batch/{batch_id}.json"));
        let envelope = self.send(GET_LEAD_IMPORT, request).await?;
        LeadImportResponse::from_envelope(&envelope)
    }

    /// Retrieves the rows of an import batch that failed. A batch without a
    /// failure report yields an empty list.
    ///
    /// # Errors
    /// Returns an error if the request fails or the report is not valid CSV.
    pub async fn lead_import_failures(
        &self,
        batch_id: i64,
    ) -> Result<Vec<LeadImportFailure>, Error> {
        self.import_report(batch_id, "failures", GET_LEAD_IMPORT_FAILURES)
            .await
    }

    /// Retrieves the rows of an import batch that were imported with
    /// warnings. A batch without a warning report yields an empty list.
    ///
    /// # Errors
    /// Returns an error if the request fails or the report is not valid CSV.
    pub async fn lead_import_warnings(
        &self,
        batch_id: i64,
    ) -> Result<Vec<LeadImportFailure>, Error> {
        self.import_report(batch_id, "warnings", GET_LEAD_IMPORT_WARNINGS)
            .await
    }

    async fn import_report(
        &self,
        batch_id: i64,
        report: &str,
        operation: &str,
    ) -> Result<Vec<LeadImportFailure>, Error> {
        let request = self.request(
            Method::GET,
            &format!("{BULK_LEADS}/batch/{batch_id}/{report}.json"),
        );
        let response = self.send_raw(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(Error::from_status(operation, status, &body));
        }
        parse_report(&body)
    }
}

/// Decodes an import report: a header row, then one row per lead whose last
/// column holds the reason.
fn parse_report(body: &[u8]) -> Result<Vec<LeadImportFailure>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);
    let headers = reader.headers()?.clone();
    let Some(reason_column) = headers.len().checked_sub(1) else {
        return Ok(Vec::new());
    };

    let mut failures = Vec::new();
    for record in reader.records() {
        let record = record?;
        let fields: HashMap<String, String> = headers
            .iter()
            .take(reason_column)
            .zip(record.iter())
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        failures.push(LeadImportFailure {
            reason: record.get(reason_column).unwrap_or_default().to_string(),
            fields,
        });
    }
    Ok(failures)
}
