use crate::envelope::Page;
use crate::error::Error;
use crate::query::Query;
use crate::types::{mark_searchable, LeadAttribute, LeadResult, ObjectField};
use crate::MarketoClient;
use reqwest::Method;
use serde::Deserialize;

const LEADS: &str = "/rest/v1/leads.json";
const DESCRIBE: &str = "/rest/v1/leads/describe.json";
const DESCRIBE2: &str = "/rest/v1/leads/describe2.json";

/// Result item of the describe2 endpoint; there is one, named "Lead".
#[derive(Deserialize)]
struct LeadSchema {
    #[serde(default)]
    fields: Vec<ObjectField>,
    #[serde(rename = "searchableFields", default)]
    searchable_fields: Vec<Vec<String>>,
}

impl MarketoClient {
    /// Retrieves the lead schema, with `searchable` set on fields that can be
    /// used as a filter type.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn describe_lead_fields(&self) -> Result<Vec<ObjectField>, Error> {
        let envelope = self.get(DESCRIBE2).await?;
        let schemas: Option<Vec<LeadSchema>> = envelope.result()?;
        Ok(schemas
            .unwrap_or_default()
            .into_iter()
            .flat_map(|mut schema| {
                mark_searchable(&mut schema.fields, &schema.searchable_fields);
                schema.fields
            })
            .collect())
    }

    /// Retrieves lead attributes from the legacy describe endpoint.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn describe_lead_attributes(&self) -> Result<Vec<LeadAttribute>, Error> {
        let envelope = self.get(DESCRIBE).await?;
        let attributes: Option<Vec<LeadAttribute>> = envelope.result()?;
        Ok(attributes.unwrap_or_default())
    }

    /// Retrieves one page of leads matching `query`. The query travels as URL
    /// parameters.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] before any request if the query is
    /// invalid, otherwise an error if the request fails or the response cannot
    /// be parsed.
    pub async fn filter_leads(&self, query: &Query) -> Result<Page<LeadResult>, Error> {
        let form = query.to_form_values()?;
        let request = self.request(Method::GET, LEADS).query(form.pairs());
        let envelope = self.send("filter leads", request).await?;
        Page::from_envelope(&envelope)
    }
}
