// REST collection endpoints
//
// CRUD helpers over `/api/s/{site}/rest/{collection}`. Every configuration
// object the provider manages lives in one of these collections and shares
// the same shape: list with GET, create with POST, update with PUT on the
// object path, remove with DELETE.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::{ControllerClient, RequestOptions};
use crate::error::Error;

fn collection_path(collection: &str) -> String {
    format!("rest/{collection}")
}

fn object_path(collection: &str, id: &str) -> String {
    format!("rest/{collection}/{id}")
}

impl ControllerClient {
    /// List every object in a collection.
    ///
    /// `GET /api/s/{site}/rest/{collection}`
    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        options: &RequestOptions,
    ) -> Result<Vec<T>, Error> {
        let objects: Vec<T> = self
            .request(Method::GET, &collection_path(collection), None::<&()>, options)
            .await?;
        debug!(collection, count = objects.len(), "listed objects");
        Ok(objects)
    }

    /// Read one object by id. `Ok(None)` when the controller has no such object.
    ///
    /// `GET /api/s/{site}/rest/{collection}/{id}`
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        options: &RequestOptions,
    ) -> Result<Option<T>, Error> {
        let result: Result<Vec<T>, Error> = self
            .request(Method::GET, &object_path(collection, id), None::<&()>, options)
            .await;
        match result {
            Ok(objects) => Ok(objects.into_iter().next()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create an object and return it as stored, with its assigned `_id`.
    ///
    /// `POST /api/s/{site}/rest/{collection}`
    pub async fn create<T, B>(
        &self,
        collection: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let created: Vec<T> = self
            .request(Method::POST, &collection_path(collection), Some(body), options)
            .await?;
        created.into_iter().next().ok_or_else(|| Error::Deserialization {
            message: format!("create on {collection} returned no object"),
            body: String::new(),
        })
    }

    /// Replace an object and return it as stored.
    ///
    /// `PUT /api/s/{site}/rest/{collection}/{id}`. Some controller versions
    /// answer a successful PUT with an empty `data` array; the object is then
    /// read back with a GET.
    pub async fn update<T, B>(
        &self,
        collection: &str,
        id: &str,
        body: &B,
        options: &RequestOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let path = object_path(collection, id);
        let updated: Vec<T> = self.request(Method::PUT, &path, Some(body), options).await?;
        if let Some(object) = updated.into_iter().next() {
            return Ok(object);
        }

        debug!(collection, id, "empty update response, reading back");
        self.get(collection, id, options)
            .await?
            .ok_or_else(|| Error::LegacyApi {
                message: "api.err.ObjectNotFound".into(),
                field: None,
                status: 404,
            })
    }

    /// Remove an object. Removing an object that is already gone succeeds.
    ///
    /// `DELETE /api/s/{site}/rest/{collection}/{id}`
    pub async fn delete(&self, collection: &str, id: &str, options: &RequestOptions) -> Result<(), Error> {
        let result: Result<Vec<serde_json::Value>, Error> = self
            .request(Method::DELETE, &object_path(collection, id), None::<&()>, options)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.root().is_not_found() => {
                debug!(collection, id, "object already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
