//! Static service registry.
//!
//! Maps service identifiers to their providers. The catalog of known
//! services also records how each service maps onto the resource groups
//! used by the cfn-guardian and cfn-monitor output formats.

use super::{InventorySnapshot, ServiceProvider, SnapshotServiceProvider};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Static description of a supported service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service identifier used on the command line and in the inventory.
    pub name: &'static str,
    /// Resource group name in a cfn-guardian config.
    pub guardian_group: &'static str,
    /// Alarm template name in a cfn-monitor config.
    pub monitor_template: &'static str,
}

/// Every service the auditor knows how to report on.
pub const SERVICE_CATALOG: &[ServiceSpec] = &[
    ServiceSpec {
        name: "apigateway",
        guardian_group: "ApiGateway",
        monitor_template: "ApiGateway",
    },
    ServiceSpec {
        name: "autoscaling",
        guardian_group: "AutoScalingGroup",
        monitor_template: "AutoScalingGroup",
    },
    ServiceSpec {
        name: "cloudfront",
        guardian_group: "CloudFrontDistribution",
        monitor_template: "CloudFrontDistribution",
    },
    ServiceSpec {
        name: "dynamodb",
        guardian_group: "DynamoDBTable",
        monitor_template: "DynamoDBTable",
    },
    ServiceSpec {
        name: "ec2",
        guardian_group: "Ec2Instance",
        monitor_template: "Ec2Instance",
    },
    ServiceSpec {
        name: "ecs",
        guardian_group: "ECSCluster",
        monitor_template: "ECSCluster",
    },
    ServiceSpec {
        name: "elasticache",
        guardian_group: "ElastiCacheReplicationGroup",
        monitor_template: "ElastiCacheReplicationGroup",
    },
    ServiceSpec {
        name: "elb",
        guardian_group: "ElasticLoadBalancer",
        monitor_template: "ElasticLoadBalancer",
    },
    ServiceSpec {
        name: "elbv2",
        guardian_group: "ApplicationLoadBalancer",
        monitor_template: "ApplicationELB",
    },
    ServiceSpec {
        name: "lambda",
        guardian_group: "Lambda",
        monitor_template: "LambdaFunction",
    },
    ServiceSpec {
        name: "rds",
        guardian_group: "RDSInstance",
        monitor_template: "RDSInstance",
    },
    ServiceSpec {
        name: "redshift",
        guardian_group: "RedshiftCluster",
        monitor_template: "RedshiftCluster",
    },
    ServiceSpec {
        name: "sqs",
        guardian_group: "SQSQueue",
        monitor_template: "SQSQueue",
    },
];

/// Looks up the catalog entry for a service identifier.
pub fn service_spec(name: &str) -> Option<&'static ServiceSpec> {
    SERVICE_CATALOG.iter().find(|spec| spec.name == name)
}

/// Registry of service providers keyed by service identifier.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    providers: BTreeMap<String, Arc<dyn ServiceProvider>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one snapshot-backed provider per catalog service.
    pub fn from_snapshot(snapshot: &InventorySnapshot) -> Self {
        let mut registry = Self::new();
        for spec in SERVICE_CATALOG {
            registry.register(Arc::new(SnapshotServiceProvider::new(
                snapshot.clone(),
                spec.name,
            )));
        }
        registry
    }

    /// Registers a provider under its own service identifier.
    pub fn register(&mut self, provider: Arc<dyn ServiceProvider>) {
        self.providers
            .insert(provider.service().to_string(), provider);
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn ServiceProvider>> {
        self.providers.get(service).cloned()
    }

    /// Registered service identifiers, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}
