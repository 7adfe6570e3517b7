use url::form_urlencoded;

/// Largest batch size, and largest number of filter values, accepted by the
/// list and filter endpoints.
pub const MAX_BATCH_SIZE: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("too few values: at least one filter value is required")]
    TooFewValues,
    #[error(
        "too many values: {count} filter values given, at most {max} allowed",
        max = MAX_BATCH_SIZE
    )]
    TooManyValues { count: usize },
    #[error("batch size {size} is outside 1..={max}", size = .0, max = MAX_BATCH_SIZE)]
    BatchSize(usize),
}

/// Parameters of a filter/list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Field to filter on (`filterType`), e.g. "email"
    pub filter_field: String,
    /// Values to match (`filterValues`), 1..=300 of them
    pub filter_values: Vec<String>,
    /// Fields to return for matching records; server default when empty
    pub fields: Vec<String>,
    /// Records per page; defaults to [`MAX_BATCH_SIZE`]
    pub batch_size: Option<usize>,
    /// Token from a previous page
    pub next_page_token: Option<String>,
}

impl Query {
    pub fn new<I, S>(filter_field: impl Into<String>, filter_values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter_field: filter_field.into(),
            filter_values: filter_values.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Continues from the page that returned `token`.
    #[must_use]
    pub fn with_page(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    /// Builds the form sent to the API.
    ///
    /// # Errors
    /// Returns an error if there are no filter values, more than
    /// [`MAX_BATCH_SIZE`] of them, or the batch size is out of range.
    pub fn to_form_values(&self) -> Result<FormValues, QueryError> {
        match self.filter_values.len() {
            0 => return Err(QueryError::TooFewValues),
            count if count > MAX_BATCH_SIZE => return Err(QueryError::TooManyValues { count }),
            _ => {}
        }
        let batch_size = self.batch_size.unwrap_or(MAX_BATCH_SIZE);
        if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(QueryError::BatchSize(batch_size));
        }

        let mut form = FormValues::default();
        form.push("filterType", self.filter_field.clone());
        form.push("filterValues", self.filter_values.join(","));
        if !self.fields.is_empty() {
            form.push("fields", self.fields.join(","));
        }
        form.push("batchSize", batch_size.to_string());
        if let Some(token) = &self.next_page_token {
            form.push("nextPageToken", token.clone());
        }
        Ok(form)
    }
}

/// Ordered key/value pairs, usable as URL parameters or as an
/// `application/x-www-form-urlencoded` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues(Vec<(&'static str, String)>);

impl FormValues {
    fn push(&mut self, key: &'static str, value: String) {
        self.0.push((key, value));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.0
    }

    #[must_use]
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter().map(|(k, v)| (*k, v.as_str())))
            .finish()
    }
}
