//! 多提供者聚合
//!
//! 同一条 UTXO 链的多个冗余提供者，按策略故障转移或合并去重。

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::future::join_all;

use super::{UtxoBalance, UtxoNetworkProvider};
use crate::{
    domain::{unique_outputs, UnspentOutput},
    error::{Result, SdkError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPoolPolicy {
    /// 使用当前提供者，传输错误时切换到下一个
    #[default]
    Failover,
    /// UTXO 查询所有提供者并合并去重，全部失败才报错
    MergeAll,
}

pub struct MultiUtxoNetworkProvider {
    providers: Vec<Arc<dyn UtxoNetworkProvider>>,
    policy: ProviderPoolPolicy,
    current: AtomicUsize,
}

impl MultiUtxoNetworkProvider {
    pub fn new(
        providers: Vec<Arc<dyn UtxoNetworkProvider>>,
        policy: ProviderPoolPolicy,
    ) -> Result<Self> {
        if providers.is_empty() {
            return Err(SdkError::transport("provider pool", "no providers configured"));
        }
        Ok(Self {
            providers,
            policy,
            current: AtomicUsize::new(0),
        })
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// 从当前提供者开始依次尝试，仅传输层错误触发切换
    async fn failover<'a, T, F>(&'a self, op: F) -> Result<T>
    where
        F: Fn(&'a dyn UtxoNetworkProvider) -> futures::future::BoxFuture<'a, Result<T>>,
    {
        let start = self.current_index();
        let mut last_error = None;

        for offset in 0..self.providers.len() {
            let index = (start + offset) % self.providers.len();
            let provider = self.providers[index].as_ref();
            match op(provider).await {
                Ok(value) => {
                    if index != start {
                        self.current.store(index, Ordering::Relaxed);
                        tracing::info!(host = %provider.host(), index, "provider_switched");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(host = %provider.host(), error = %e, "provider_failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| SdkError::transport("provider pool", "no providers")))
    }
}

#[async_trait]
impl UtxoNetworkProvider for MultiUtxoNetworkProvider {
    fn host(&self) -> &str {
        let index = self.current_index() % self.providers.len();
        self.providers[index].host()
    }

    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        match self.policy {
            ProviderPoolPolicy::Failover => {
                self.failover(|p| p.unspent_outputs(address)).await
            }
            ProviderPoolPolicy::MergeAll => {
                let results =
                    join_all(self.providers.iter().map(|p| p.unspent_outputs(address))).await;

                let mut merged = Vec::new();
                let mut first_error = None;
                let mut any_ok = false;
                for (provider, result) in self.providers.iter().zip(results) {
                    match result {
                        Ok(outputs) => {
                            any_ok = true;
                            merged.extend(outputs);
                        }
                        Err(e) => {
                            tracing::warn!(host = %provider.host(), error = %e, "provider_failed");
                            first_error.get_or_insert(e);
                        }
                    }
                }

                match (any_ok, first_error) {
                    (false, Some(e)) => Err(e),
                    _ => Ok(unique_outputs(merged)),
                }
            }
        }
    }

    async fn balance(&self, address: &str) -> Result<UtxoBalance> {
        self.failover(|p| p.balance(address)).await
    }

    async fn send(&self, raw_hex: &str) -> Result<String> {
        self.failover(|p| p.send(raw_hex)).await
    }

    async fn estimate_fee_rate(&self, target_blocks: u32) -> Result<Option<f64>> {
        self.failover(|p| p.estimate_fee_rate(target_blocks)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    struct StubProvider {
        host: String,
        outputs: Result<Vec<UnspentOutput>>,
        calls: AtomicU32,
    }

    impl StubProvider {
        fn ok(host: &str, outputs: Vec<UnspentOutput>) -> Arc<Self> {
            Arc::new(Self {
                host: host.into(),
                outputs: Ok(outputs),
                calls: AtomicU32::new(0),
            })
        }

        fn down(host: &str) -> Arc<Self> {
            Arc::new(Self {
                host: host.into(),
                outputs: Err(SdkError::transport(host, "connection refused")),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl UtxoNetworkProvider for StubProvider {
        fn host(&self) -> &str {
            &self.host
        }

        async fn unspent_outputs(&self, _address: &str) -> Result<Vec<UnspentOutput>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outputs {
                Ok(o) => Ok(o.clone()),
                Err(_) => Err(SdkError::transport(&self.host, "connection refused")),
            }
        }

        async fn balance(&self, _address: &str) -> Result<UtxoBalance> {
            match &self.outputs {
                Ok(o) => Ok(UtxoBalance {
                    confirmed: o.iter().map(|u| u.amount).sum(),
                    unconfirmed: 0,
                }),
                Err(_) => Err(SdkError::transport(&self.host, "connection refused")),
            }
        }

        async fn send(&self, _raw_hex: &str) -> Result<String> {
            Err(SdkError::NotImplemented)
        }

        async fn estimate_fee_rate(&self, _target_blocks: u32) -> Result<Option<f64>> {
            Ok(Some(0.0001))
        }
    }

    fn output(hash: &str, index: u32) -> UnspentOutput {
        UnspentOutput {
            address: "addr".into(),
            amount: 1000,
            output_index: index,
            transaction_hash: hash.into(),
            assets: vec![],
        }
    }

    #[tokio::test]
    async fn test_failover_switches_on_transport_error() {
        let down = StubProvider::down("a");
        let up = StubProvider::ok("b", vec![output("aa", 0)]);
        let pool = MultiUtxoNetworkProvider::new(
            vec![down.clone() as Arc<dyn UtxoNetworkProvider>, up.clone()],
            ProviderPoolPolicy::Failover,
        )
        .unwrap();

        let outputs = pool.unspent_outputs("addr").await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(pool.current_index(), 1);
        assert_eq!(pool.host(), "b");

        // 切换后直接从新的提供者开始
        pool.unspent_outputs("addr").await.unwrap();
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_does_not_switch() {
        let pool = MultiUtxoNetworkProvider::new(
            vec![
                StubProvider::ok("a", vec![]) as Arc<dyn UtxoNetworkProvider>,
                StubProvider::ok("b", vec![]),
            ],
            ProviderPoolPolicy::Failover,
        )
        .unwrap();
        assert!(matches!(pool.send("00").await, Err(SdkError::NotImplemented)));
        assert_eq!(pool.current_index(), 0);
    }

    #[tokio::test]
    async fn test_merge_all_deduplicates() {
        let pool = MultiUtxoNetworkProvider::new(
            vec![
                StubProvider::ok("a", vec![output("aa", 0), output("bb", 1)])
                    as Arc<dyn UtxoNetworkProvider>,
                StubProvider::down("b"),
                StubProvider::ok("c", vec![output("aa", 0), output("cc", 0)]),
            ],
            ProviderPoolPolicy::MergeAll,
        )
        .unwrap();

        let outputs = pool.unspent_outputs("addr").await.unwrap();
        let keys: Vec<_> = outputs.iter().map(|o| o.key()).collect();
        assert_eq!(keys, vec![("aa", 0), ("bb", 1), ("cc", 0)]);
    }

    #[tokio::test]
    async fn test_merge_all_fails_only_when_all_fail() {
        let pool = MultiUtxoNetworkProvider::new(
            vec![
                StubProvider::down("a") as Arc<dyn UtxoNetworkProvider>,
                StubProvider::down("b"),
            ],
            ProviderPoolPolicy::MergeAll,
        )
        .unwrap();
        assert!(pool.unspent_outputs("addr").await.is_err());
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(MultiUtxoNetworkProvider::new(vec![], ProviderPoolPolicy::Failover).is_err());
    }
}
