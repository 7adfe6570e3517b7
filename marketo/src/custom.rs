use crate::envelope::Page;
use crate::error::{Error, ErrorCode, Reason};
use crate::query::Query;
use crate::types::{mark_searchable, CustomObject, CustomObjectMetadata};
use crate::MarketoClient;

const CUSTOM_OBJECTS: &str = "/rest/v1/customobjects";

impl MarketoClient {
    /// Lists the custom object types of the instance.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn list_custom_objects(&self) -> Result<Vec<CustomObjectMetadata>, Error> {
        let envelope = self.get(&format!("{CUSTOM_OBJECTS}.json")).await?;
        let objects: Option<Vec<CustomObjectMetadata>> = envelope.result()?;
        Ok(objects.unwrap_or_default())
    }

    /// Describes one custom object type, tagging its searchable fields.
    ///
    /// # Arguments
    /// * `name` - API name of the object, e.g. "car_c"
    ///
    /// # Errors
    /// Returns an error if the object does not exist (the API answers 404),
    /// the request fails, or the response cannot be parsed.
    pub async fn describe_custom_object(&self, name: &str) -> Result<CustomObjectMetadata, Error> {
        let envelope = self
            .get(&format!("{CUSTOM_OBJECTS}/{name}/describe.json"))
            .await?;
        let objects: Option<Vec<CustomObjectMetadata>> = envelope.result()?;
        let mut object = objects
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| Error::Api {
                status: 200,
                reasons: vec![Reason::from(ErrorCode::NotFound)],
            })?;
        mark_searchable(&mut object.fields, &object.searchable_fields);
        Ok(object)
    }

    /// Retrieves one page of `name` records matching `query`. The query is
    /// sent as a form body.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] before any request if the query is
    /// invalid, otherwise an error if the request fails or the response cannot
    /// be parsed.
    pub async fn filter_custom_objects(
        &self,
        name: &str,
        query: &Query,
    ) -> Result<Page<CustomObject>, Error> {
        let form = query.to_form_values()?;
        let envelope = self
            .post_form(&format!("{CUSTOM_OBJECTS}/{name}.json"), &form)
            .await?;
        Page::from_envelope(&envelope)
    }
}
