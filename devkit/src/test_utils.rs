/*!
Test Harness pour le collecteur Symbion

Facilite l'écriture de tests d'intégration avec:
- Démarrage de N hôtes stub et d'une API de ressources
- Adresses prêtes à injecter dans la config du daemon
- Attente bornée sur une condition (polling en arrière-plan)
*/

use crate::exposition::ExpositionBuilder;
use crate::stub_host::{StubHost, StubResourceApi};
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Harness de test : possède les stubs, qui s'arrêtent quand il est droppé
pub struct TestHarness {
    hosts: Vec<StubHost>,
    resource_api: Option<StubResourceApi>,
}

impl TestHarness {
    /// Crée un harness vide
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            hosts: Vec::new(),
            resource_api: None,
        }
    }

    /// Ajoute un hôte qui sert `body` sur `/metrics`
    pub async fn spawn_host(&mut self, body: impl Into<String>) -> Result<&StubHost> {
        let host = StubHost::spawn(body).await?;
        log::info!("🖥️ Spawned stub host #{} at {}", self.hosts.len(), host.address());
        self.hosts.push(host);
        Ok(&self.hosts[self.hosts.len() - 1])
    }

    /// Ajoute un hôte exposant les quatre indexes d'une application
    pub async fn spawn_app_host(&mut self, app_id: &str, cpu: f64, memory: f64) -> Result<&StubHost> {
        let body = ExpositionBuilder::new()
            .comment("TYPE container_cpu_usage_high_result gauge")
            .app_usage(app_id, cpu, memory)
            .build();
        self.spawn_host(body).await
    }

    /// Démarre l'API de ressources partagée par tous les hôtes (tous en 127.0.0.1)
    pub async fn with_resource_api(mut self, num_cores: u32, memory_capacity: u64) -> Result<Self> {
        self.resource_api = Some(StubResourceApi::spawn(num_cores, memory_capacity).await?);
        Ok(self)
    }

    pub fn resource_api(&self) -> Option<&StubResourceApi> {
        self.resource_api.as_ref()
    }

    pub fn host(&self, i: usize) -> &StubHost {
        &self.hosts[i]
    }

    /// Adresses `127.0.0.1:port` de tous les hôtes, dans l'ordre de création
    pub fn addresses(&self) -> Vec<String> {
        self.hosts.iter().map(StubHost::address).collect()
    }

    /// Adresse sur laquelle plus rien n'écoute (connexion refusée)
    pub async fn dead_address() -> Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);
        Ok(addr.to_string())
    }

    /// Réévalue `check` toutes les 50ms jusqu'à `true` ou expiration
    pub async fn wait_until<F, Fut>(&self, timeout_ms: u64, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        log::warn!("⏰ Timeout waiting for condition after {}ms", timeout_ms);
        false
    }

    /// Stats sur les requêtes reçues par les stubs
    pub fn get_stats(&self) -> TestStats {
        let hits_per_host: Vec<usize> = self.hosts.iter().map(StubHost::hits).collect();
        TestStats {
            hosts: self.hosts.len(),
            total_hits: hits_per_host.iter().sum(),
            hits_per_host,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub hosts: usize,
    pub total_hits: usize,
    pub hits_per_host: Vec<usize>,
}

impl TestStats {
    pub fn print(&self) {
        println!("📊 Test Statistics:");
        println!("  Stub hosts: {}", self.hosts);
        println!("  Total /metrics hits: {}", self.total_hits);
        for (i, hits) in self.hits_per_host.iter().enumerate() {
            println!("    host #{}: {} hits", i, hits);
        }
    }
}
