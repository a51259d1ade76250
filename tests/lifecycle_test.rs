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

use async_trait::async_trait;
use common::{ssh_host, Events, FakeConnector, FakeProvisioner};
use hopssh::config::{Config, Settings};
use hopssh::{Endpoint, HostRegistry, ProfileResolver, Result, Suite, VerificationContext};
use std::sync::Arc;

fn suite(events: &Events, settings: &Settings) -> Suite {
    Suite::new(
        Arc::new(HostRegistry::new()),
        ProfileResolver::new(Arc::new(FakeProvisioner::default())),
        Arc::new(FakeConnector::new(events.clone())),
        settings,
    )
}

fn hosts() -> Vec<hopssh::HostDescriptor> {
    vec![
        ssh_host("bastion", "10.0.0.1", None),
        ssh_host("web", "10.0.0.2", Some("bastion")),
    ]
}

/// Context that uses only the default hooks.
struct PlainContext;

impl VerificationContext for PlainContext {}

/// Context that holds an endpoint for the duration of each example.
#[derive(Default)]
struct HttpContext {
    endpoint: Option<Endpoint>,
    seen: Vec<String>,
}

#[async_trait]
impl VerificationContext for HttpContext {
    async fn before_each(&mut self, suite: &Suite, example: &str) -> Result<()> {
        self.seen.push(format!("before {example}"));
        self.endpoint = Some(suite.resolver().resolve("web", 80).await?);
        Ok(())
    }

    async fn after_each(&mut self, _suite: &Suite, example: &str) -> Result<()> {
        self.seen.push(format!("after {example}"));
        match self.endpoint.take() {
            Some(endpoint) => endpoint.release().await,
            None => Ok(()),
        }
    }
}

#[tokio::test]
async fn test_default_hooks_do_nothing() {
    let events = Events::default();
    let suite = suite(&events, &Settings::default());
    suite.before_suite(hosts()).await.unwrap();

    let mut context = PlainContext;
    suite.before_each(&mut context, "example").await.unwrap();
    suite.after_each(&mut context, "example").await.unwrap();

    assert!(events.all().is_empty());
    suite.after_suite().await.unwrap();
}

#[tokio::test]
async fn test_context_hooks_wrap_each_example() {
    let events = Events::default();
    let suite = suite(&events, &Settings::default());
    suite.before_suite(hosts()).await.unwrap();

    let mut context = HttpContext::default();
    for example in ["serves index", "serves health"] {
        suite.before_each(&mut context, example).await.unwrap();
        assert!(context.endpoint.as_ref().unwrap().is_tunneled());
        suite.after_each(&mut context, example).await.unwrap();
    }

    assert_eq!(
        context.seen,
        vec![
            "before serves index",
            "after serves index",
            "before serves health",
            "after serves health",
        ]
    );
    assert_eq!(events.count("open bastion"), 2);
    assert_eq!(events.count("close bastion"), 2);
    assert_eq!(suite.resolver().open_sessions(), 0);

    suite.after_suite().await.unwrap();
}

#[tokio::test]
async fn test_after_suite_sweeps_and_resets() {
    let events = Events::default();
    let suite = suite(&events, &Settings::default());
    suite.before_suite(hosts()).await.unwrap();
    assert_eq!(suite.registry().len(), 2);

    let leaked = suite.resolver().resolve("web", 80).await.unwrap();
    assert_eq!(suite.resolver().open_sessions(), 1);

    suite.after_suite().await.unwrap();
    assert_eq!(suite.resolver().open_sessions(), 0);
    assert_eq!(events.count("close bastion"), 1);
    assert!(suite.registry().is_empty());

    leaked.release().await.unwrap();
    assert_eq!(events.count("close bastion"), 1);
}

#[tokio::test]
async fn test_before_suite_replaces_hosts() {
    let events = Events::default();
    let suite = suite(&events, &Settings::default());
    suite.before_suite(hosts()).await.unwrap();
    suite
        .before_suite(vec![ssh_host("db", "10.0.0.3", None)])
        .await
        .unwrap();

    assert_eq!(suite.registry().len(), 1);
    assert!(suite.registry().find("web").is_err());
    assert!(suite.registry().find("db").is_ok());
}

#[tokio::test]
async fn test_suite_from_hosts_file() {
    let yaml = r#"
settings:
  share_sessions: true
hosts:
  - name: bastion
    address: 10.0.0.1
    ssh:
      user: admin
  - name: web
    address: 10.0.0.2
    from: bastion
    ssh:
      user: admin
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let events = Events::default();
    let suite = suite(&events, &config.settings);
    suite.before_suite(config.descriptors()).await.unwrap();

    let first = suite.resolver().resolve("web", 80).await.unwrap();
    let second = suite.resolver().resolve("web", 443).await.unwrap();
    assert_eq!(events.count("open bastion"), 1);
    assert_eq!(suite.resolver().pooled_leases("bastion").await, 2);

    first.release().await.unwrap();
    second.release().await.unwrap();
    suite.after_suite().await.unwrap();
    assert_eq!(events.count("close bastion"), 1);
}
