//! Generic CRUD calls against one admin collection.

use crate::interceptor::{ApiClient, ApiRequest};
use crate::{AuthError, AuthResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page_num: u32,
    pub page_size: u32,
    pub keyword: Option<String>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 10,
            keyword: None,
        }
    }
}

impl PageQuery {
    pub fn new(page_num: u32, page_size: u32) -> Self {
        Self {
            page_num,
            page_size,
            keyword: None,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    #[serde(default)]
    pub total_row: u64,
}

/// CRUD collaborator bound to a collection path such as `/api/v1/admin/users`.
#[derive(Clone)]
pub struct AdminResource {
    api: ApiClient,
    base_path: String,
    page_path: String,
}

impl AdminResource {
    /// Pages are listed with a GET on the collection itself; `{base_path}/x`
    /// is always a single record.
    pub fn new(api: ApiClient, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        let page_path = base_path.clone();
        Self {
            api,
            base_path,
            page_path,
        }
    }

    pub fn with_page_path(mut self, page_path: impl Into<String>) -> Self {
        self.page_path = page_path.into();
        self
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn member_path(&self, id: impl Display) -> String {
        format!("{}/{}", self.base_path.trim_end_matches('/'), id)
    }

    pub async fn page<T: DeserializeOwned>(&self, query: &PageQuery) -> AuthResult<PageResult<T>> {
        let mut request = ApiRequest::get(self.page_path.clone())
            .query("pageNum", query.page_num)
            .query("pageSize", query.page_size);
        if let Some(keyword) = query.keyword.as_deref().filter(|k| !k.is_empty()) {
            request = request.query("keyword", keyword);
        }

        let page: Option<PageResult<T>> = self.api.send(&request).await?;
        Ok(page.unwrap_or(PageResult {
            records: Vec::new(),
            total_row: 0,
        }))
    }

    pub async fn get<T: DeserializeOwned>(&self, id: impl Display) -> AuthResult<T> {
        self.api.send(&ApiRequest::get(self.member_path(id))).await
    }

    pub async fn create<T: DeserializeOwned>(&self, body: Value) -> AuthResult<T> {
        self.api
            .send(&ApiRequest::post(self.base_path.clone()).json(body))
            .await
    }

    pub async fn update<T: DeserializeOwned>(&self, id: impl Display, body: Value) -> AuthResult<T> {
        self.api
            .send(&ApiRequest::put(self.member_path(id)).json(body))
            .await
    }

    pub async fn remove(&self, id: impl Display) -> AuthResult<()> {
        self.api
            .send::<Value>(&ApiRequest::delete(self.member_path(id)))
            .await
            .map(|_| ())
    }

    /// DELETE the collection with the id list as body.
    pub async fn batch_remove<I: Serialize>(&self, ids: &[I]) -> AuthResult<()> {
        let body = serde_json::to_value(ids)
            .map_err(|err| AuthError::Protocol(err.to_string()))?;
        self.api
            .send::<Value>(&ApiRequest::delete(self.base_path.clone()).json(body))
            .await
            .map(|_| ())
    }

    /// POST to `{base_path}{sub_path}`; `sub_path` brings its own slash.
    pub async fn post_action<T: DeserializeOwned>(
        &self,
        sub_path: &str,
        body: Option<Value>,
    ) -> AuthResult<T> {
        let path = format!("{}{}", self.base_path, sub_path);
        let body = body.unwrap_or_else(|| Value::Object(Default::default()));
        self.api.send(&ApiRequest::post(path).json(body)).await
    }

    /// PUT to `{base_path}/{sub_path}`.
    pub async fn put_action<T: DeserializeOwned>(
        &self,
        sub_path: &str,
        body: Option<Value>,
    ) -> AuthResult<T> {
        let path = self.member_path(sub_path.trim_start_matches('/'));
        let body = body.unwrap_or_else(|| Value::Object(Default::default()));
        self.api.send(&ApiRequest::put(path).json(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_query_defaults() {
        let query = PageQuery::default();
        assert_eq!(query.page_num, 1);
        assert_eq!(query.page_size, 10);
        assert!(query.keyword.is_none());
        assert_eq!(
            PageQuery::new(2, 20).with_keyword("bob").keyword.as_deref(),
            Some("bob")
        );
    }

    #[test]
    fn test_page_result_defaults_missing_fields() {
        let page: PageResult<Value> = serde_json::from_value(json!({})).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_row, 0);

        let page: PageResult<Value> =
            serde_json::from_value(json!({"records": [{"id": 1}], "totalRow": 31})).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total_row, 31);
    }
}
