// DNS-over-HTTPS, JSON flavour (Cloudflare / Google `application/dns-json`).

use std::net::Ipv4Addr;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use url::Url;

const A_RECORD: u16 = 1;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// Query `endpoint` for the A records of `domain`.
///
/// Only answers with `type == 1` whose data is a dotted quad are kept;
/// CNAME hops in the answer section are skipped.
pub async fn query_doh(
    client: &reqwest::Client,
    endpoint: &Url,
    domain: &str,
    timeout: Duration,
) -> Result<Vec<Ipv4Addr>, reqwest::Error> {
    let response: DohResponse = client
        .get(endpoint.clone())
        .query(&[("name", domain), ("type", "A")])
        .header(ACCEPT, "application/dns-json")
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let mut ips = Vec::new();
    for answer in response.answer {
        if answer.record_type != A_RECORD {
            continue;
        }
        if let Ok(ip) = answer.data.trim().parse::<Ipv4Addr>() {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    Ok(ips)
}
