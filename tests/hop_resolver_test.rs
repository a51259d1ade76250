// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use common::{ssh_host, vagrant_host, FakeProvisioner, Harness};
use hopssh::Error;
use std::net::IpAddr;

const WEB_SSH_CONFIG: &str = "Host web\n  HostName 10.0.0.5\n  User vagrant\n  Port 22\n  IdentityFile /tmp/key\n";

fn three_tier() -> Harness {
    Harness::new(vec![
        ssh_host("bastion", "10.0.0.1", None),
        ssh_host("web", "10.0.0.2", Some("bastion")),
        ssh_host("db", "10.0.0.3", Some("web")),
    ])
}

#[tokio::test]
async fn test_direct_host_resolves_to_its_own_address() {
    let harness = three_tier();

    let endpoint = harness.resolver.resolve("bastion", 443).await.unwrap();
    assert_eq!(endpoint.host(), "10.0.0.1");
    assert_eq!(endpoint.port(), 443);
    assert!(!endpoint.is_tunneled());
    assert_eq!(endpoint.depth(), 0);

    endpoint.release().await.unwrap();
    assert!(harness.events.all().is_empty());
}

#[tokio::test]
async fn test_one_gateway_session_per_hop() {
    let harness = three_tier();

    let endpoint = harness.resolver.resolve("db", 5432).await.unwrap();
    assert!(endpoint.is_tunneled());
    assert_eq!(endpoint.depth(), 2);
    assert_eq!(harness.resolver.open_sessions(), 2);
    assert_eq!(harness.events.count("open "), 2);

    let host: IpAddr = endpoint.host().parse().unwrap();
    assert!(host.is_loopback());
    assert_ne!(endpoint.port(), 5432);

    endpoint.release().await.unwrap();
    assert_eq!(harness.resolver.open_sessions(), 0);
}

#[tokio::test]
async fn test_chain_is_built_outermost_first() {
    let harness = three_tier();

    let endpoint = harness.resolver.resolve("db", 5432).await.unwrap();
    let events = harness.events.all();

    assert_eq!(events[0], "open bastion via 10.0.0.1:22");
    assert_eq!(events[1], "forward bastion->10.0.0.2:22");
    assert!(
        events[2].starts_with("open web via 127.0.0.1:"),
        "web must be dialed through bastion's forward, got {events:?}"
    );
    assert_eq!(events[3], "forward web->10.0.0.3:5432");
    assert_eq!(events.len(), 4);

    endpoint.release().await.unwrap();
}

#[tokio::test]
async fn test_release_tears_down_innermost_first() {
    let harness = three_tier();

    let endpoint = harness.resolver.resolve("db", 5432).await.unwrap();
    harness.events.clear();
    endpoint.release().await.unwrap();

    assert_eq!(
        harness.events.all(),
        vec![
            "unforward web->10.0.0.3:5432",
            "close web",
            "unforward bastion->10.0.0.2:22",
            "close bastion",
        ]
    );
}

#[tokio::test]
async fn test_provisioned_gateway_exposes_loopback_port() {
    let harness = Harness::build(
        vec![vagrant_host("web", "10.0.0.5", None)],
        FakeProvisioner::default().answer("web", WEB_SSH_CONFIG),
        false,
    );

    let endpoint = harness
        .resolver
        .open_tunnel("web", "localhost", 80)
        .await
        .unwrap();
    let host: IpAddr = endpoint.host().parse().unwrap();
    assert!(host.is_loopback());
    assert_ne!(endpoint.port(), 80);
    assert_eq!(
        harness.events.all(),
        vec!["open web via 10.0.0.5:22", "forward web->localhost:80"]
    );

    endpoint.release().await.unwrap();
    assert_eq!(harness.events.count("close web"), 1);
    assert_eq!(harness.resolver.open_sessions(), 0);
}

#[tokio::test]
async fn test_host_behind_provisioned_gateway() {
    let harness = Harness::build(
        vec![
            vagrant_host("web", "10.0.0.5", None),
            ssh_host("db", "10.0.0.6", Some("web")),
        ],
        FakeProvisioner::default().answer("web", WEB_SSH_CONFIG),
        false,
    );

    let endpoint = harness.resolver.resolve("db", 5432).await.unwrap();
    assert_eq!(endpoint.depth(), 1);
    assert_eq!(
        harness.events.all(),
        vec!["open web via 10.0.0.5:22", "forward web->10.0.0.6:5432"]
    );

    harness.events.clear();
    endpoint.release().await.unwrap();
    assert_eq!(
        harness.events.all(),
        vec!["unforward web->10.0.0.6:5432", "close web"]
    );
}

#[tokio::test]
async fn test_cycle_fails_before_connecting() {
    let harness = Harness::new(vec![
        ssh_host("a", "10.0.1.1", Some("b")),
        ssh_host("b", "10.0.1.2", Some("a")),
    ]);

    let err = harness.resolver.resolve("a", 22).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }), "got {err:?}");
    assert!(err.to_string().contains("a -> b -> a"));
    assert!(harness.events.all().is_empty());
}

#[tokio::test]
async fn test_unknown_names_fail_before_connecting() {
    let harness = Harness::new(vec![ssh_host("web", "10.0.0.2", Some("ghost"))]);

    let err = harness.resolver.resolve("nowhere", 80).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");

    let err = harness.resolver.resolve("web", 80).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");
    assert!(harness.events.all().is_empty());
}

#[tokio::test]
async fn test_failed_hop_releases_outer_hops() {
    let harness = three_tier();
    harness.connector.reject_host("web");

    let err = harness.resolver.resolve("db", 5432).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { ref host, .. } if host == "web"));

    let events = harness.events.all();
    assert_eq!(
        events,
        vec![
            "open bastion via 10.0.0.1:22",
            "forward bastion->10.0.0.2:22",
            "reject web",
            "unforward bastion->10.0.0.2:22",
            "close bastion",
        ]
    );
    assert_eq!(harness.resolver.open_sessions(), 0);
}

#[tokio::test]
async fn test_refused_forward_closes_its_session() {
    let harness = three_tier();
    harness.connector.refuse_port(5432);

    let err = harness.resolver.resolve("db", 5432).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Tunnel { ref gateway, remote_port: 5432, .. } if gateway == "web"
    ));
    assert_eq!(harness.events.count("close "), 2);
    assert_eq!(harness.resolver.open_sessions(), 0);
}

#[tokio::test]
async fn test_chain_depth_limit() {
    let harness = three_tier();
    let resolver = hopssh::HopResolver::new(
        harness.registry.clone(),
        harness.resolver.profiles().clone(),
        harness.connector.clone(),
    )
    .with_max_chain_depth(1);

    let err = resolver.resolve("db", 5432).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }), "got {err:?}");
    assert!(harness.events.all().is_empty());

    let endpoint = resolver.resolve("web", 80).await.unwrap();
    assert_eq!(endpoint.depth(), 1);
    endpoint.release().await.unwrap();
}

#[tokio::test]
async fn test_with_endpoint_releases_after_probe() {
    let harness = three_tier();

    let seen = harness
        .resolver
        .with_endpoint("web", 8080, |host, port| async move { format!("{host}:{port}") })
        .await
        .unwrap();

    assert!(seen.starts_with("127.0.0.1:"));
    assert_ne!(seen, "127.0.0.1:8080");
    assert_eq!(harness.events.count("close bastion"), 1);
    assert_eq!(harness.resolver.open_sessions(), 0);
}

#[tokio::test]
async fn test_forwarded_port_is_closed_after_release() {
    let harness = three_tier();

    let endpoint = harness.resolver.resolve("web", 80).await.unwrap();
    let address = endpoint.socket_string();
    assert!(tokio::net::TcpStream::connect(&address).await.is_ok());

    endpoint.release().await.unwrap();
    assert!(tokio::net::TcpStream::connect(&address).await.is_err());
}

#[tokio::test]
async fn test_close_all_sweeps_unreleased_sessions() {
    let harness = three_tier();

    let first = harness.resolver.resolve("db", 5432).await.unwrap();
    let second = harness.resolver.resolve("web", 80).await.unwrap();
    assert_eq!(harness.resolver.open_sessions(), 3);

    harness.resolver.close_all().await.unwrap();
    assert_eq!(harness.resolver.open_sessions(), 0);
    assert_eq!(harness.events.count("close "), 3);

    // Releasing afterwards finds everything already closed.
    first.release().await.unwrap();
    second.release().await.unwrap();
    assert_eq!(harness.events.count("close "), 3);
}

#[tokio::test]
async fn test_duplicate_name_resolves_to_first_definition() {
    let harness = Harness::new(vec![
        ssh_host("web", "10.0.0.2", None),
        ssh_host("web", "10.9.9.9", None),
    ]);

    let endpoint = harness.resolver.resolve("web", 80).await.unwrap();
    assert_eq!(endpoint.host(), "10.0.0.2");
    endpoint.release().await.unwrap();
}

#[tokio::test]
async fn test_profiles_are_provisioned_once() {
    let harness = Harness::build(
        vec![
            vagrant_host("web", "10.0.0.5", None),
            ssh_host("db", "10.0.0.6", Some("web")),
        ],
        FakeProvisioner::default().answer("web", WEB_SSH_CONFIG),
        false,
    );

    for _ in 0..3 {
        let endpoint = harness.resolver.resolve("db", 5432).await.unwrap();
        endpoint.release().await.unwrap();
    }
    assert_eq!(*harness.provisioner.calls.lock().unwrap(), vec!["web"]);
    assert_eq!(harness.events.count("open web"), 3);
}
