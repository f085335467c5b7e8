/**
 * RETRIEVER CONCURRENT - Scrape parallèle des hôtes backend
 *
 * RÔLE : pour chaque hôte, GET http://<host>/metrics avec timeout, filtrage des
 * lignes puis parsing. Un hôte en erreur est loggé et ignoré, jamais fatal.
 *
 * FONCTIONNEMENT :
 * - Fan-out : une task tokio par hôte dans un JoinSet propre au cycle
 * - Fan-in : on attend que toutes les tasks aient répondu (succès ou erreur)
 * - Pas de deadline globale : la durée du cycle = l'hôte le plus lent
 * - Si le cycle est abandonné, le JoinSet est droppé et les tasks annulées
 */

use crate::codec;
use crate::filter::LineFilter;
use crate::models::{HostAddress, RawBatch, SampleBatch};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, timeout: Duration, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source,
            }
        }
    }
}

pub fn metrics_url(host: &str) -> String {
    format!("http://{host}/metrics")
}

/// Runs `task` once per host concurrently and returns the successful results
/// in host-list order. Failures are logged with `what` and dropped.
pub(crate) async fn fan_out<T, E, F, Fut>(hosts: &[HostAddress], what: &str, task: F) -> Vec<T>
where
    F: Fn(HostAddress) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let mut set = JoinSet::new();
    for (position, host) in hosts.iter().enumerate() {
        let fut = task(host.clone());
        let host = host.clone();
        set.spawn(async move { (position, host, fut.await) });
    }

    let mut collected = Vec::with_capacity(hosts.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((position, _, Ok(value))) => collected.push((position, value)),
            Ok((_, host, Err(e))) => warn!(host = %host, error = %e, "{what} failed"),
            Err(e) => error!(error = %e, "{what} task aborted"),
        }
    }

    collected.sort_by_key(|(position, _)| *position);
    collected.into_iter().map(|(_, value)| value).collect()
}

/// Fetch one host and keep the lines accepted by `filter`.
pub async fn fetch_raw(
    client: &reqwest::Client,
    host: &str,
    timeout: Duration,
    filter: &LineFilter,
) -> Result<RawBatch, FetchError> {
    let url = metrics_url(host);
    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(&url, timeout, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status { url, status });
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(&url, timeout, e))?;

    let lines: Vec<String> = body
        .lines()
        .filter(|line| filter.matches(line))
        .map(str::to_string)
        .collect();

    debug!(host = %host, kept = lines.len(), "scraped host");
    Ok(RawBatch {
        host: host.to_string(),
        lines,
    })
}

/// Fan-out over every host; hosts in error contribute nothing.
pub async fn retrieve_raw(
    client: &reqwest::Client,
    hosts: &[HostAddress],
    timeout: Duration,
    filter: &LineFilter,
) -> Vec<RawBatch> {
    fan_out(hosts, "metrics scrape", |host| {
        let client = client.clone();
        let filter = filter.clone();
        async move { fetch_raw(&client, &host, timeout, &filter).await }
    })
    .await
}

/// Decode raw batches; a line that fails to parse is skipped on its own.
pub fn parse_batches(raw: Vec<RawBatch>) -> Vec<SampleBatch> {
    raw.into_iter()
        .map(|batch| {
            let samples = batch
                .lines
                .iter()
                .filter_map(|line| match codec::parse(line) {
                    Ok(sample) => Some(sample),
                    Err(e) => {
                        warn!(host = %batch.host, error = %e, "skipping unparsable line");
                        None
                    }
                })
                .collect();
            SampleBatch::new(batch.host, samples)
        })
        .collect()
}

/// Scrape, filter and parse in one call.
pub async fn retrieve(
    client: &reqwest::Client,
    hosts: &[HostAddress],
    timeout: Duration,
    filter: &LineFilter,
) -> Vec<SampleBatch> {
    parse_batches(retrieve_raw(client, hosts, timeout, filter).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_url() {
        assert_eq!(metrics_url("10.0.0.1:9100"), "http://10.0.0.1:9100/metrics");
    }

    #[test]
    fn test_parse_batches_skips_bad_lines() {
        let raw = vec![RawBatch {
            host: "h1:1".into(),
            lines: vec![
                r#"container_cpu_usage_high_result{app_id="a"} 10"#.into(),
                r#"container_cpu_usage_high_result{app_id} 10"#.into(),
                r#"container_cpu_usage_high_result{app_id="b"} nope"#.into(),
                r#"container_cpu_usage_low_result{app_id="a"} 2"#.into(),
            ],
        }];
        let batches = parse_batches(raw);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0].samples[1].value, 2.0);
    }

    #[tokio::test]
    async fn test_fan_out_keeps_host_order_and_drops_errors() {
        let hosts: Vec<HostAddress> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let results = fan_out(&hosts, "test", |host| async move {
            if host == "c" {
                return Err(format!("{host} unreachable"));
            }
            // le premier hôte répond en dernier
            if host == "a" {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            Ok(host)
        })
        .await;
        assert_eq!(results, vec!["a", "b", "d"]);
    }

    #[tokio::test]
    async fn test_fan_out_empty_host_list() {
        let results: Vec<u8> = fan_out(&[], "test", |_| async { Ok::<u8, String>(1) }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_not_fatal() {
        let client = reqwest::Client::new();
        // port 9 (discard) sur loopback: connexion refusée en général
        let hosts = vec!["127.0.0.1:9".to_string()];
        let batches = retrieve(&client, &hosts, Duration::from_millis(300), &LineFilter::default()).await;
        assert!(batches.is_empty());
    }
}
