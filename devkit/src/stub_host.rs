/*!
Hôtes stub pour tester le collecteur sans vrai parc

- `StubHost` : sert `GET /metrics` avec un corps, un statut et un délai
  modifiables pendant le test, et compte les requêtes reçues
- `StubResourceApi` : sert `GET /api/v1.3/machine` et
  `POST /api/v1.3/containers/` au format attendu par le moniteur d'hôte

Chaque stub écoute sur 127.0.0.1 avec un port éphémère ; le serveur est
arrêté quand le stub est droppé.
*/

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct Behavior {
    body: String,
    status: u16,
    delay: Duration,
}

#[derive(Clone)]
struct StubState {
    behavior: Arc<Mutex<Behavior>>,
    hits: Arc<AtomicUsize>,
}

/// Faux exporter `/metrics`
pub struct StubHost {
    addr: SocketAddr,
    state: StubState,
    server: JoinHandle<()>,
}

impl StubHost {
    /// Démarre un stub qui répond 200 avec `body`
    pub async fn spawn(body: impl Into<String>) -> Result<Self> {
        let state = StubState {
            behavior: Arc::new(Mutex::new(Behavior {
                body: body.into(),
                status: 200,
                delay: Duration::ZERO,
            })),
            hits: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route("/metrics", get(serve_metrics))
            .with_state(state.clone());
        let (addr, server) = serve(app).await?;
        log::info!("🧪 [STUB] metrics host listening on {}", addr);

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// `host:port`, directement utilisable comme adresse d'hôte
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_body(&self, body: impl Into<String>) {
        self.state.behavior.lock().unwrap().body = body.into();
    }

    pub fn set_status(&self, status: u16) {
        self.state.behavior.lock().unwrap().status = status;
    }

    /// Délai avant chaque réponse, pour simuler un hôte lent
    pub fn set_delay(&self, delay: Duration) {
        self.state.behavior.lock().unwrap().delay = delay;
    }

    /// Nombre de requêtes `/metrics` reçues
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StubHost {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve_metrics(State(state): State<StubState>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let behavior = state.behavior.lock().unwrap().clone();
    if !behavior.delay.is_zero() {
        tokio::time::sleep(behavior.delay).await;
    }
    let status = StatusCode::from_u16(behavior.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, behavior.body)
}

#[derive(Debug, Clone)]
struct Machine {
    num_cores: u32,
    memory_capacity: u64,
    memory_limit: u64,
    cpu_total_delta_ns: u64,
    memory_usage: u64,
}

/// Fausse API de ressources (style cAdvisor)
pub struct StubResourceApi {
    addr: SocketAddr,
    machine: Arc<Mutex<Machine>>,
    server: JoinHandle<()>,
}

impl StubResourceApi {
    /// Machine avec `num_cores` coeurs et `memory_capacity` octets ; par
    /// défaut le conteneur racine consomme 50% CPU et 25% mémoire
    pub async fn spawn(num_cores: u32, memory_capacity: u64) -> Result<Self> {
        let machine = Arc::new(Mutex::new(Machine {
            num_cores,
            memory_capacity,
            memory_limit: u64::MAX,
            // 1s entre les deux échantillons
            cpu_total_delta_ns: u64::from(num_cores) * 500_000_000,
            memory_usage: memory_capacity / 4,
        }));

        let app = Router::new()
            .route("/api/v1.3/machine", get(serve_machine))
            .route("/api/v1.3/containers/", post(serve_root_container))
            .with_state(machine.clone());
        let (addr, server) = serve(app).await?;
        log::info!("🧪 [STUB] resource api listening on {}", addr);

        Ok(Self {
            addr,
            machine,
            server,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Fixe l'utilisation CPU (en % de la machine) entre les deux échantillons
    pub fn set_cpu_percent(&self, percent: f64) {
        let mut machine = self.machine.lock().unwrap();
        let full = u64::from(machine.num_cores) as f64 * 1_000_000_000.0;
        machine.cpu_total_delta_ns = (full * percent / 100.0) as u64;
    }

    pub fn set_memory_usage(&self, bytes: u64) {
        self.machine.lock().unwrap().memory_usage = bytes;
    }

    pub fn set_memory_limit(&self, bytes: u64) {
        self.machine.lock().unwrap().memory_limit = bytes;
    }
}

impl Drop for StubResourceApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve_machine(State(machine): State<Arc<Mutex<Machine>>>) -> Json<Value> {
    let machine = machine.lock().unwrap().clone();
    Json(json!({
        "num_cores": machine.num_cores,
        "memory_capacity": machine.memory_capacity,
    }))
}

async fn serve_root_container(
    State(machine): State<Arc<Mutex<Machine>>>,
    Json(request): Json<Value>,
) -> Json<Value> {
    let machine = machine.lock().unwrap().clone();
    let num_stats = request["num_stats"].as_u64().unwrap_or(2).max(1) as usize;

    let base_total: u64 = 10_000_000_000;
    let samples = [
        ("2024-01-01T00:00:00Z", base_total),
        ("2024-01-01T00:00:01Z", base_total + machine.cpu_total_delta_ns),
    ];
    let stats: Vec<Value> = samples
        .iter()
        .rev()
        .take(num_stats)
        .rev()
        .map(|(ts, total)| {
            json!({
                "timestamp": ts,
                "cpu": { "usage": { "total": total } },
                "memory": { "usage": machine.memory_usage },
            })
        })
        .collect();

    Json(json!({
        "spec": {
            "has_cpu": true,
            "has_memory": true,
            "memory": { "limit": machine.memory_limit },
        },
        "stats": stats,
    }))
}

async fn serve(app: Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::warn!("⚠️ [STUB] server on {} stopped: {}", addr, e);
        }
    });
    Ok((addr, server))
}
