//! UTXO 集合管理
//!
//! 快照按地址保存，每个刷新周期整体替换，读者永远看不到半更新的集合。
//! 失效（钱包切换、关闭）会提升代际号，之前开始的刷新结果被丢弃。

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::future::try_join_all;
use tokio::sync::RwLock;

use super::network::UtxoNetworkProvider;
use crate::{
    domain::{unique_outputs, UnspentOutput},
    error::{Result, SdkError},
};

type Snapshot = Arc<HashMap<String, Vec<UnspentOutput>>>;

/// 刷新凭证，记录刷新开始时的代际号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

#[derive(Debug, Default)]
pub struct UnspentOutputManager {
    snapshot: RwLock<Snapshot>,
    generation: AtomicU64,
}

impl UnspentOutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket {
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// 用新结果替换快照；凭证过期时返回 false 且不做任何修改
    pub async fn apply(
        &self,
        ticket: RefreshTicket,
        outputs: HashMap<String, Vec<UnspentOutput>>,
    ) -> bool {
        let mut guard = self.snapshot.write().await;
        if self.generation.load(Ordering::SeqCst) != ticket.generation {
            tracing::debug!(generation = ticket.generation, "stale_utxo_refresh_discarded");
            return false;
        }
        *guard = Arc::new(outputs);
        true
    }

    /// 清空快照并使进行中的刷新失效
    pub async fn invalidate(&self) {
        let mut guard = self.snapshot.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *guard = Arc::new(HashMap::new());
    }

    /// 并发拉取所有地址的 UTXO，任一地址失败则整体失败
    pub async fn fetch(
        &self,
        provider: &dyn UtxoNetworkProvider,
        addresses: &[String],
    ) -> Result<Vec<UnspentOutput>> {
        let ticket = self.begin_refresh();

        let results = try_join_all(addresses.iter().map(|address| async move {
            let outputs = provider.unspent_outputs(address).await?;
            Ok::<_, SdkError>((address.clone(), unique_outputs(outputs)))
        }))
        .await?;

        let fetched: HashMap<String, Vec<UnspentOutput>> = results.into_iter().collect();
        let all = collect_unique(&fetched);
        if !self.apply(ticket, fetched).await {
            return Err(SdkError::Cancelled);
        }

        tracing::debug!(
            host = %provider.host(),
            addresses = addresses.len(),
            outputs = all.len(),
            "utxo_set_refreshed"
        );
        Ok(all)
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// 全部 UTXO（跨地址去重）
    pub async fn outputs(&self) -> Vec<UnspentOutput> {
        collect_unique(&*self.snapshot().await)
    }

    pub async fn outputs_for(&self, address: &str) -> Vec<UnspentOutput> {
        self.snapshot()
            .await
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn balance(&self) -> u64 {
        self.outputs().await.iter().map(|o| o.amount).sum()
    }

    /// 广播后移除已花费的输出（整体替换快照）
    pub async fn remove_spent(&self, spent: &[UnspentOutput]) {
        let mut guard = self.snapshot.write().await;
        let next: HashMap<String, Vec<UnspentOutput>> = guard
            .iter()
            .map(|(address, outputs)| {
                let kept = outputs
                    .iter()
                    .filter(|o| !spent.iter().any(|s| s.key() == o.key()))
                    .cloned()
                    .collect();
                (address.clone(), kept)
            })
            .collect();
        *guard = Arc::new(next);
    }
}

fn collect_unique(snapshot: &HashMap<String, Vec<UnspentOutput>>) -> Vec<UnspentOutput> {
    let mut addresses: Vec<&String> = snapshot.keys().collect();
    addresses.sort();
    unique_outputs(
        addresses
            .into_iter()
            .flat_map(|a| snapshot[a].iter().cloned()),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::service::network::UtxoBalance;

    struct StaticProvider {
        outputs: HashMap<String, Vec<UnspentOutput>>,
        delay: Duration,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl UtxoNetworkProvider for StaticProvider {
        fn host(&self) -> &str {
            "static"
        }

        async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>> {
            tokio::time::sleep(self.delay).await;
            if self.fail_for.as_deref() == Some(address) {
                return Err(SdkError::transport("static", "connection reset"));
            }
            Ok(self.outputs.get(address).cloned().unwrap_or_default())
        }

        async fn balance(&self, _address: &str) -> Result<UtxoBalance> {
            Ok(UtxoBalance::default())
        }

        async fn send(&self, _raw_hex: &str) -> Result<String> {
            Err(SdkError::NotImplemented)
        }

        async fn estimate_fee_rate(&self, _target_blocks: u32) -> Result<Option<f64>> {
            Ok(None)
        }
    }

    fn output(address: &str, hash: &str, index: u32, amount: u64) -> UnspentOutput {
        UnspentOutput {
            address: address.to_string(),
            amount,
            output_index: index,
            transaction_hash: hash.to_string(),
            assets: vec![],
        }
    }

    fn provider(delay: Duration, fail_for: Option<&str>) -> StaticProvider {
        let mut outputs = HashMap::new();
        outputs.insert(
            "a".to_string(),
            vec![output("a", "h1", 0, 100), output("a", "h1", 0, 100)],
        );
        outputs.insert("b".to_string(), vec![output("b", "h2", 1, 50)]);
        StaticProvider {
            outputs,
            delay,
            fail_for: fail_for.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_fetch_dedupes_and_stores_snapshot() {
        let manager = UnspentOutputManager::new();
        let all = manager
            .fetch(
                &provider(Duration::ZERO, None),
                &["a".to_string(), "b".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(manager.balance().await, 150);
        assert_eq!(manager.outputs_for("a").await.len(), 1);
    }

    #[tokio::test]
    async fn test_one_failed_address_fails_the_fetch() {
        let manager = UnspentOutputManager::new();
        let result = manager
            .fetch(
                &provider(Duration::ZERO, Some("b")),
                &["a".to_string(), "b".to_string()],
            )
            .await;

        assert!(result.is_err());
        assert!(manager.outputs().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidated_refresh_does_not_mutate_state() {
        let manager = Arc::new(UnspentOutputManager::new());
        let slow = provider(Duration::from_millis(100), None);

        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.fetch(&slow, &["a".to_string()]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.invalidate().await;

        assert!(matches!(task.await.unwrap(), Err(SdkError::Cancelled)));
        assert!(manager.outputs().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_spent_replaces_snapshot() {
        let manager = UnspentOutputManager::new();
        manager
            .fetch(
                &provider(Duration::ZERO, None),
                &["a".to_string(), "b".to_string()],
            )
            .await
            .unwrap();

        let before = manager.snapshot().await;
        manager.remove_spent(&[output("a", "h1", 0, 100)]).await;

        assert_eq!(before["a"].len(), 1);
        assert!(manager.outputs_for("a").await.is_empty());
        assert_eq!(manager.balance().await, 50);
    }
}
