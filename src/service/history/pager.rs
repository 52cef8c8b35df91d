//! 历史分页
//!
//! 页码从 1 开始；遇到 [`ExplorerApiError::EndOfHistory`] 或超过总页数后停止翻页。

use std::sync::Arc;

use async_trait::async_trait;

use super::{EtherscanMapper, TransactionHistoryMapper};
use crate::{
    domain::{AmountType, TransactionRecord},
    error::{ExplorerApiError, Result, SdkError},
    service::network::{
        blockbook::{AddressPageRequest, BlockBookAddressResponse},
        etherscan::{EtherscanAction, EtherscanPageRequest},
        BlockBookProvider, EtherscanProvider,
    },
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub address: String,
    pub amount_type: AmountType,
    pub page: u32,
    pub page_size: u32,
}

impl HistoryRequest {
    fn contract(&self) -> Option<String> {
        match &self.amount_type {
            AmountType::Coin => None,
            AmountType::Token(token) => Some(token.contract_address.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub records: Vec<TransactionRecord>,
    pub total_pages: Option<u32>,
}

/// 拉取并映射一页历史
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_page(&mut self, request: &HistoryRequest) -> Result<HistoryPage>;

    /// 清空映射器的序号计数
    fn reset(&mut self);
}

/// 钱包门面使用的历史服务接口
#[async_trait]
pub trait TransactionHistoryService: Send + Sync {
    async fn load_next_page(&mut self) -> Result<Vec<TransactionRecord>>;

    fn can_fetch_more(&self) -> bool;

    fn reset(&mut self);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 数据源
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BlockBookHistorySource<M> {
    provider: Arc<BlockBookProvider>,
    mapper: M,
}

impl<M> BlockBookHistorySource<M> {
    pub fn new(provider: Arc<BlockBookProvider>, mapper: M) -> Self {
        Self { provider, mapper }
    }
}

#[async_trait]
impl<M> HistorySource for BlockBookHistorySource<M>
where
    M: TransactionHistoryMapper<Response = BlockBookAddressResponse> + Sync,
{
    async fn fetch_page(&mut self, request: &HistoryRequest) -> Result<HistoryPage> {
        let page_request = AddressPageRequest {
            page: request.page,
            page_size: request.page_size,
            contract: request.contract(),
        };
        let response = self
            .provider
            .address_info(&request.address, &page_request)
            .await?;

        let records = self
            .mapper
            .map(&response, &request.address, &request.amount_type)?;
        Ok(HistoryPage {
            total_pages: self.mapper.total_pages(&response, &request.amount_type),
            records,
        })
    }

    fn reset(&mut self) {
        self.mapper.reset();
    }
}

pub struct EtherscanHistorySource {
    provider: Arc<EtherscanProvider>,
    mapper: EtherscanMapper,
}

impl EtherscanHistorySource {
    pub fn new(provider: Arc<EtherscanProvider>, mapper: EtherscanMapper) -> Self {
        Self { provider, mapper }
    }
}

#[async_trait]
impl HistorySource for EtherscanHistorySource {
    async fn fetch_page(&mut self, request: &HistoryRequest) -> Result<HistoryPage> {
        let action = match request.amount_type {
            AmountType::Coin => EtherscanAction::TxList,
            AmountType::Token(_) => EtherscanAction::TokenTx,
        };
        let response = self
            .provider
            .transactions(&EtherscanPageRequest {
                address: request.address.clone(),
                action,
                contract_address: request.contract(),
                page: request.page,
                offset: request.page_size,
            })
            .await?;

        Ok(HistoryPage {
            records: self
                .mapper
                .map(&response, &request.address, &request.amount_type)?,
            total_pages: None,
        })
    }

    fn reset(&mut self) {
        self.mapper.reset();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 分页器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TransactionHistoryPager<S> {
    source: S,
    address: String,
    amount_type: AmountType,
    page_size: u32,
    next_page: u32,
    total_pages: Option<u32>,
    exhausted: bool,
}

impl<S: HistorySource> TransactionHistoryPager<S> {
    pub fn new(source: S, address: impl Into<String>, amount_type: AmountType) -> Self {
        Self {
            source,
            address: address.into(),
            amount_type,
            page_size: DEFAULT_PAGE_SIZE,
            next_page: 1,
            total_pages: None,
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn amount_type(&self) -> &AmountType {
        &self.amount_type
    }
}

#[async_trait]
impl<S: HistorySource> TransactionHistoryService for TransactionHistoryPager<S> {
    /// 历史结束时返回空页，之后 [`can_fetch_more`](Self::can_fetch_more) 为 false
    async fn load_next_page(&mut self) -> Result<Vec<TransactionRecord>> {
        if !self.can_fetch_more() {
            return Ok(Vec::new());
        }

        let request = HistoryRequest {
            address: self.address.clone(),
            amount_type: self.amount_type.clone(),
            page: self.next_page,
            page_size: self.page_size,
        };

        match self.source.fetch_page(&request).await {
            Ok(page) => {
                self.next_page += 1;
                self.total_pages = page.total_pages;
                tracing::debug!(
                    address = %self.address,
                    page = request.page,
                    records = page.records.len(),
                    "history_page_loaded"
                );
                Ok(page.records)
            }
            Err(SdkError::Explorer(ExplorerApiError::EndOfHistory)) => {
                self.exhausted = true;
                tracing::debug!(address = %self.address, page = request.page, "history_exhausted");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn can_fetch_more(&self) -> bool {
        !self.exhausted && self.total_pages.map_or(true, |total| self.next_page <= total)
    }

    fn reset(&mut self) {
        self.next_page = 1;
        self.total_pages = None;
        self.exhausted = false;
        self.source.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct ScriptedSource {
        pages: VecDeque<Result<HistoryPage>>,
        requests: Vec<u32>,
        resets: usize,
    }

    #[async_trait]
    impl HistorySource for ScriptedSource {
        async fn fetch_page(&mut self, request: &HistoryRequest) -> Result<HistoryPage> {
            self.requests.push(request.page);
            self.pages
                .pop_front()
                .unwrap_or(Err(ExplorerApiError::EndOfHistory.into()))
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn source(pages: Vec<Result<HistoryPage>>) -> ScriptedSource {
        ScriptedSource {
            pages: pages.into(),
            requests: vec![],
            resets: 0,
        }
    }

    fn page(total_pages: Option<u32>) -> Result<HistoryPage> {
        Ok(HistoryPage {
            records: vec![],
            total_pages,
        })
    }

    #[tokio::test]
    async fn test_stops_after_total_pages() {
        let mut pager =
            TransactionHistoryPager::new(source(vec![page(Some(2)), page(Some(2))]), "a", AmountType::Coin);

        pager.load_next_page().await.unwrap();
        assert!(pager.can_fetch_more());
        pager.load_next_page().await.unwrap();
        assert!(!pager.can_fetch_more());

        pager.load_next_page().await.unwrap();
        assert_eq!(pager.source.requests, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_end_of_history_marks_exhausted() {
        let mut pager = TransactionHistoryPager::new(source(vec![page(None)]), "a", AmountType::Coin);

        pager.load_next_page().await.unwrap();
        assert!(pager.can_fetch_more());
        assert!(pager.load_next_page().await.unwrap().is_empty());
        assert!(!pager.can_fetch_more());
    }

    #[tokio::test]
    async fn test_errors_keep_page_position() {
        let mut pager = TransactionHistoryPager::new(
            source(vec![Err(ExplorerApiError::RateLimited.into()), page(None)]),
            "a",
            AmountType::Coin,
        );

        assert!(matches!(
            pager.load_next_page().await,
            Err(SdkError::Explorer(ExplorerApiError::RateLimited))
        ));
        pager.load_next_page().await.unwrap();
        assert_eq!(pager.source.requests, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_reset_restarts_from_first_page() {
        let mut pager = TransactionHistoryPager::new(source(vec![page(Some(1))]), "a", AmountType::Coin);
        pager.load_next_page().await.unwrap();
        assert!(!pager.can_fetch_more());

        pager.reset();
        assert!(pager.can_fetch_more());
        assert_eq!(pager.source.resets, 1);
        pager.load_next_page().await.unwrap();
        assert_eq!(pager.source.requests, vec![1, 1]);
    }
}
