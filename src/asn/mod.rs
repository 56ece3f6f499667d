use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use itertools::Itertools;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::{error::Result, types::Asn};

pub mod http;

pub use http::HttpAsnLookup;

/// The public lookup services throttle aggressively, so only a few requests may be in flight.
pub const DEFAULT_CONCURRENT_LOOKUPS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsnRecord {
    pub asn: Asn,
    pub holder: Option<String>,
}

#[async_trait]
pub trait AsnLookup: Send + Sync {
    async fn lookup_asn(&self, address: &str) -> Result<AsnRecord>;

    async fn lookup_name(&self, asn: Asn) -> Result<String>;
}

pub fn placeholder_name(asn: Asn) -> String {
    format!("AS{asn}")
}

/// Memoizing front of an [`AsnLookup`].
///
/// Successful answers are kept for the lifetime of the resolver. Failures are not
/// remembered, so the next call for the same key asks the service again.
pub struct AsnResolver<L> {
    lookup: L,
    permits: Semaphore,
    asns: Mutex<HashMap<String, Asn>>,
    names: Mutex<HashMap<Asn, String>>,
}

impl<L: AsnLookup> AsnResolver<L> {
    pub fn new(lookup: L, concurrency: usize) -> Self {
        Self {
            lookup,
            permits: Semaphore::new(concurrency.max(1)),
            asns: Default::default(),
            names: Default::default(),
        }
    }

    pub async fn resolve_asn(&self, address: &str) -> Option<Asn> {
        if let Some(asn) = self.asns.lock().get(address) {
            return Some(*asn);
        }

        let record = {
            let _permit = self.permits.acquire().await.ok()?;
            self.lookup.lookup_asn(address).await
        };

        match record {
            Ok(AsnRecord { asn, holder }) if asn > 0 => {
                self.asns.lock().entry(address.to_owned()).or_insert(asn);
                if let Some(holder) = holder.filter(|h| !h.is_empty()) {
                    self.names.lock().entry(asn).or_insert(holder);
                }
                Some(asn)
            }
            Ok(_) => {
                debug!("No ASN for {address}");
                None
            }
            Err(e) => {
                debug!("ASN lookup for {address} failed: {e}");
                None
            }
        }
    }

    /// Holder name of `asn`, or `AS<asn>` if it can't be looked up.
    pub async fn resolve_name(&self, asn: Asn) -> String {
        if let Some(name) = self.names.lock().get(&asn) {
            return name.clone();
        }

        let name = match self.permits.acquire().await {
            Ok(_permit) => self.lookup.lookup_name(asn).await,
            Err(_) => return placeholder_name(asn),
        };

        match name {
            Ok(name) if !name.is_empty() => {
                self.names.lock().entry(asn).or_insert(name).clone()
            }
            Ok(_) => placeholder_name(asn),
            Err(e) => {
                debug!("Name lookup for AS{asn} failed: {e}");
                placeholder_name(asn)
            }
        }
    }

    /// Resolves every distinct address concurrently. Unresolved addresses are left out.
    pub async fn resolve_all<'a>(
        &self,
        addresses: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, Asn> {
        let lookups = addresses
            .into_iter()
            .unique()
            .map(|address| async move { (address, self.resolve_asn(address).await) });
        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(address, asn)| asn.map(|asn| (address.to_owned(), asn)))
            .collect()
    }

    pub async fn resolve_names(&self, asns: impl IntoIterator<Item = Asn>) -> HashMap<Asn, String> {
        let lookups = asns
            .into_iter()
            .unique()
            .map(|asn| async move { (asn, self.resolve_name(asn).await) });
        join_all(lookups).await.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct FakeLookup {
        asns: HashMap<String, AsnRecord>,
        names: HashMap<Asn, String>,
        asn_calls: AtomicUsize,
        name_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeLookup {
        fn with_asn(mut self, address: &str, asn: Asn, holder: Option<&str>) -> Self {
            self.asns.insert(
                address.to_owned(),
                AsnRecord {
                    asn,
                    holder: holder.map(str::to_owned),
                },
            );
            self
        }

        fn with_name(mut self, asn: Asn, name: &str) -> Self {
            self.names.insert(asn, name.to_owned());
            self
        }

        async fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AsnLookup for FakeLookup {
        async fn lookup_asn(&self, address: &str) -> Result<AsnRecord> {
            self.asn_calls.fetch_add(1, Ordering::SeqCst);
            self.enter().await;
            self.asns
                .get(address)
                .cloned()
                .ok_or_else(|| Error::Lookup(format!("unknown address {address}")))
        }

        async fn lookup_name(&self, asn: Asn) -> Result<String> {
            self.name_calls.fetch_add(1, Ordering::SeqCst);
            self.enter().await;
            self.names
                .get(&asn)
                .cloned()
                .ok_or_else(|| Error::Lookup(format!("unknown AS{asn}")))
        }
    }

    #[tokio::test]
    async fn test_address_is_looked_up_once() {
        let resolver = AsnResolver::new(FakeLookup::default().with_asn("192.0.2.1", 64500, None), 8);
        assert_eq!(resolver.resolve_asn("192.0.2.1").await, Some(64500));
        assert_eq!(resolver.resolve_asn("192.0.2.1").await, Some(64500));
        assert_eq!(resolver.lookup.asn_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let resolver = AsnResolver::new(FakeLookup::default(), 8);
        assert_eq!(resolver.resolve_asn("192.0.2.1").await, None);
        assert_eq!(resolver.resolve_asn("192.0.2.1").await, None);
        assert_eq!(resolver.lookup.asn_calls.load(Ordering::SeqCst), 2);
        // A permit is given back on every failure
        assert_eq!(resolver.permits.available_permits(), 8);
    }

    #[tokio::test]
    async fn test_zero_asn_is_a_miss() {
        let resolver = AsnResolver::new(FakeLookup::default().with_asn("10.0.0.1", 0, None), 8);
        assert_eq!(resolver.resolve_asn("10.0.0.1").await, None);
        assert_eq!(resolver.resolve_asn("10.0.0.1").await, None);
        assert_eq!(resolver.lookup.asn_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_name_fallback() {
        let resolver = AsnResolver::new(FakeLookup::default().with_name(64500, "EXAMPLE-NET"), 8);
        assert_eq!(resolver.resolve_name(64500).await, "EXAMPLE-NET");
        assert_eq!(resolver.resolve_name(64500).await, "EXAMPLE-NET");
        assert_eq!(resolver.lookup.name_calls.load(Ordering::SeqCst), 1);

        assert_eq!(resolver.resolve_name(64501).await, "AS64501");
        assert_eq!(resolver.resolve_name(64501).await, "AS64501");
        assert_eq!(resolver.lookup.name_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_holder_from_address_lookup_is_reused() {
        let lookup = FakeLookup::default()
            .with_asn("192.0.2.1", 64500, Some("EXAMPLE-NET, ZZ"))
            .with_name(64500, "Other name");
        let resolver = AsnResolver::new(lookup, 8);
        assert_eq!(resolver.resolve_asn("192.0.2.1").await, Some(64500));
        assert_eq!(resolver.resolve_name(64500).await, "EXAMPLE-NET, ZZ");
        assert_eq!(resolver.lookup.name_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let mut lookup = FakeLookup::default();
        let addresses: Vec<String> = (1..=50).map(|i| format!("198.51.100.{i}")).collect();
        for (i, address) in addresses.iter().enumerate() {
            lookup = lookup.with_asn(address, 64500 + i as Asn % 3, None);
        }
        lookup.delay = Some(Duration::from_millis(100));
        let resolver = AsnResolver::new(lookup, 4);

        let resolved = resolver
            .resolve_all(addresses.iter().chain(addresses.iter()).map(String::as_str))
            .await;
        assert_eq!(resolved.len(), 50);
        assert_eq!(resolver.lookup.asn_calls.load(Ordering::SeqCst), 50);
        assert_eq!(resolver.lookup.max_in_flight.load(Ordering::SeqCst), 4);
        assert_eq!(resolver.permits.available_permits(), 4);
    }

    #[tokio::test]
    async fn test_resolve_all_skips_failures() {
        let resolver = AsnResolver::new(FakeLookup::default().with_asn("192.0.2.1", 64500, None), 2);
        let resolved = resolver.resolve_all(["192.0.2.1", "192.0.2.2"]).await;
        assert_eq!(resolved, HashMap::from([("192.0.2.1".to_owned(), 64500)]));
    }
}
