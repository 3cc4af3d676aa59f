//!
//! Metrics emission
//! ----------------
//! Fire-and-forget counter observations to CloudWatch. Emission happens on a
//! detached task so a slow or failing metrics endpoint can never stall or
//! abort a transfer; failures are logged at `warn` and swallowed. Local-mode
//! servers run with the sink disabled.

use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::types::{MetricDatum, StandardUnit};
use tracing::warn;

#[derive(Clone, Debug)]
pub enum MetricsSink {
    Disabled,
    CloudWatch {
        client: aws_sdk_cloudwatch::Client,
        namespace: String,
    },
}

impl MetricsSink {
    pub fn disabled() -> Self {
        MetricsSink::Disabled
    }

    pub fn cloudwatch(sdk_config: &aws_config::SdkConfig, namespace: impl Into<String>) -> Self {
        MetricsSink::CloudWatch {
            client: aws_sdk_cloudwatch::Client::new(sdk_config),
            namespace: namespace.into(),
        }
    }

    /// Record one named observation. Returns immediately; the actual put
    /// runs on a spawned task.
    pub fn emit(&self, name: &'static str, value: f64) {
        let MetricsSink::CloudWatch { client, namespace } = self else {
            return;
        };
        let client = client.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move {
            let datum = MetricDatum::builder()
                .metric_name(name)
                .value(value)
                .unit(StandardUnit::Count)
                .build();
            if let Err(e) = client
                .put_metric_data()
                .namespace(namespace)
                .metric_data(datum)
                .send()
                .await
            {
                warn!(target: "ferry::metrics", "failed to emit {}: {}", name, DisplayErrorContext(&e));
            }
        });
    }
}
