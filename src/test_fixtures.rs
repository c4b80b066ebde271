use crate::core::api::{ApiError, CollectionsApi};
use crate::core::models::{
    BatchKind, CollectionMetadata, CollectionPage, Company, CompanyBatch, CompanyId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A collection with `size` companies numbered from 1
pub fn sample_collection(id: &str, size: usize) -> (CollectionMetadata, Vec<Company>) {
    let companies = (1..=size as CompanyId)
        .map(|n| Company {
            id: n,
            company_name: format!("Company {n}"),
            liked: n % 3 == 0,
        })
        .collect();
    (
        CollectionMetadata {
            id: id.to_string(),
            collection_name: format!("Collection {id}"),
        },
        companies,
    )
}

/// In-memory collections service for tests.
///
/// `latency` delays only the mutating calls so tests can race them against
/// cancellation; reads answer immediately.
pub struct MockCollectionsApi {
    collections: Vec<(CollectionMetadata, Vec<Company>)>,
    liked_collection_id: Option<String>,
    latency: Duration,
    failure_status: Option<u16>,
    page_requests: AtomicUsize,
    liked_calls: Mutex<Vec<(BatchKind, Vec<CompanyId>)>>,
    my_list_calls: Mutex<Vec<Vec<CompanyId>>>,
}

impl MockCollectionsApi {
    pub fn new() -> Self {
        Self {
            collections: Vec::new(),
            liked_collection_id: None,
            latency: Duration::ZERO,
            failure_status: None,
            page_requests: AtomicUsize::new(0),
            liked_calls: Mutex::new(Vec::new()),
            my_list_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_collection(mut self, collection: (CollectionMetadata, Vec<Company>)) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn with_liked_collection(mut self, id: &str) -> Self {
        self.liked_collection_id = Some(id.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every mutating call fail with the given HTTP status
    pub fn failing_with_status(mut self, status: u16) -> Self {
        self.failure_status = Some(status);
        self
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    pub fn liked_calls(&self) -> Vec<(BatchKind, Vec<CompanyId>)> {
        self.liked_calls.lock().unwrap().clone()
    }

    pub fn my_list_calls(&self) -> Vec<Vec<CompanyId>> {
        self.my_list_calls.lock().unwrap().clone()
    }

    fn find(&self, collection_id: &str) -> Result<&(CollectionMetadata, Vec<Company>), ApiError> {
        self.collections
            .iter()
            .find(|(meta, _)| meta.id == collection_id)
            .ok_or_else(|| ApiError::Server {
                operation: "get_collection_page".to_string(),
                status: 404,
                body: format!("collection {collection_id} not found"),
            })
    }

    async fn mutate(&self, operation: &str) -> Result<(), ApiError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.failure_status {
            Some(status) => Err(ApiError::Server {
                operation: operation.to_string(),
                status,
                body: "simulated failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for MockCollectionsApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollectionsApi for MockCollectionsApi {
    async fn get_collection_page(
        &self,
        collection_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<CollectionPage, ApiError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let (meta, companies) = self.find(collection_id)?;
        Ok(CollectionPage {
            id: meta.id.clone(),
            collection_name: meta.collection_name.clone(),
            companies: companies
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect(),
            total: companies.len() as u64,
        })
    }

    async fn get_companies(&self, offset: u64, limit: u32) -> Result<CompanyBatch, ApiError> {
        let mut all: Vec<Company> = self
            .collections
            .iter()
            .flat_map(|(_, companies)| companies.iter().cloned())
            .collect();
        all.sort_by_key(|c| c.id);
        all.dedup_by_key(|c| c.id);
        let total = all.len() as u64;
        Ok(CompanyBatch {
            companies: all
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            total: Some(total),
        })
    }

    async fn list_collections(&self) -> Result<Vec<CollectionMetadata>, ApiError> {
        Ok(self.collections.iter().map(|(meta, _)| meta.clone()).collect())
    }

    async fn get_liked_collection_id(&self) -> Result<String, ApiError> {
        self.liked_collection_id
            .clone()
            .ok_or_else(|| ApiError::Server {
                operation: "get_liked_collection_id".to_string(),
                status: 404,
                body: "Liked Companies List not found".to_string(),
            })
    }

    async fn get_collection_company_ids(
        &self,
        collection_id: &str,
    ) -> Result<Vec<CompanyId>, ApiError> {
        let (_, companies) = self.find(collection_id)?;
        Ok(companies.iter().map(|c| c.id).collect())
    }

    async fn add_to_liked(&self, company_ids: &[CompanyId]) -> Result<(), ApiError> {
        self.liked_calls
            .lock()
            .unwrap()
            .push((BatchKind::Add, company_ids.to_vec()));
        self.mutate("add_liked").await
    }

    async fn remove_from_liked(&self, company_ids: &[CompanyId]) -> Result<(), ApiError> {
        self.liked_calls
            .lock()
            .unwrap()
            .push((BatchKind::Remove, company_ids.to_vec()));
        self.mutate("remove_liked").await
    }

    async fn add_to_my_list(&self, company_ids: &[CompanyId]) -> Result<(), ApiError> {
        self.my_list_calls.lock().unwrap().push(company_ids.to_vec());
        self.mutate("add_my_list").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_pages_through_collection() {
        let api = MockCollectionsApi::new().with_collection(sample_collection("c1", 30));

        let page = api.get_collection_page("c1", 25, 25).await.unwrap();
        assert_eq!(page.companies.len(), 5);
        assert_eq!(page.total, 30);
        assert_eq!(api.page_requests(), 1);

        let missing = api.get_collection_page("nope", 0, 25).await;
        assert!(matches!(missing, Err(ApiError::Server { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_mock_records_mutations() {
        let api = MockCollectionsApi::new();
        api.add_to_liked(&[1, 2]).await.unwrap();
        api.remove_from_liked(&[2]).await.unwrap();
        api.add_to_my_list(&[3]).await.unwrap();

        assert_eq!(
            api.liked_calls(),
            vec![(BatchKind::Add, vec![1, 2]), (BatchKind::Remove, vec![2])]
        );
        assert_eq!(api.my_list_calls(), vec![vec![3]]);
    }
}
