//! The three logging-stack components and their sizing.

use std::fmt;

use crate::aws::{ContainerDefinition, KeyValuePair, PortMapping};

/// Elastic release every image is pinned to
pub const ELASTIC_VERSION: &str = "8.10.0";

/// In-cluster address of the search engine
const ELASTICSEARCH_URL: &str = "http://elasticsearch:9200";

const LOGSTASH_PIPELINE: &str = r#"input { beats { port => 5044 } }
filter { }
output {
  elasticsearch {
    hosts => ["http://elasticsearch:9200"]
    index => "logstash-%{+YYYY.MM.dd}"
  }
}
"#;

/// A service of the logging stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoggingComponent {
    Elasticsearch,
    Logstash,
    Kibana,
}

impl LoggingComponent {
    /// Declaration order
    pub const ALL: [LoggingComponent; 3] = [
        LoggingComponent::Elasticsearch,
        LoggingComponent::Logstash,
        LoggingComponent::Kibana,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LoggingComponent::Elasticsearch => "elasticsearch",
            LoggingComponent::Logstash => "logstash",
            LoggingComponent::Kibana => "kibana",
        }
    }

    /// Port the container listens on and the target group forwards to
    pub fn port(self) -> u16 {
        match self {
            LoggingComponent::Elasticsearch => 9200,
            LoggingComponent::Logstash => 5044,
            LoggingComponent::Kibana => 5601,
        }
    }

    /// Priority of the path-based listener rule
    pub fn listener_priority(self) -> u32 {
        match self {
            LoggingComponent::Elasticsearch => 10,
            LoggingComponent::Logstash => 20,
            LoggingComponent::Kibana => 30,
        }
    }

    /// Path pattern routed to the component
    pub fn path_pattern(self) -> String {
        format!("/{}*", self.name())
    }

    /// Task-level CPU units
    pub fn task_cpu(self) -> u32 {
        match self {
            LoggingComponent::Logstash => 256,
            _ => 1024,
        }
    }

    /// Task-level memory in MiB
    pub fn task_memory(self) -> u32 {
        match self {
            LoggingComponent::Logstash => 512,
            _ => 2048,
        }
    }

    pub fn desired_count(self) -> u32 {
        match self {
            LoggingComponent::Kibana => 1,
            _ => 2,
        }
    }

    pub fn image(self) -> String {
        format!(
            "docker.elastic.co/{name}/{name}:{version}",
            name = self.name(),
            version = ELASTIC_VERSION
        )
    }

    fn environment(self) -> Vec<KeyValuePair> {
        match self {
            LoggingComponent::Elasticsearch => vec![
                KeyValuePair::new("discovery.type", "single-node"),
                KeyValuePair::new("xpack.security.enabled", "false"),
            ],
            LoggingComponent::Logstash => vec![
                KeyValuePair::new("LS_JAVA_OPTS", "-Xmx256m -Xms256m"),
                KeyValuePair::new("LOGSTASH_CONFIG_STRING", LOGSTASH_PIPELINE),
            ],
            LoggingComponent::Kibana => {
                vec![KeyValuePair::new("ELASTICSEARCH_HOSTS", ELASTICSEARCH_URL)]
            }
        }
    }

    /// The single container of the component's task
    pub fn container(self) -> ContainerDefinition {
        let (cpu, memory, essential) = match self {
            LoggingComponent::Logstash => (256, 512, Some(true)),
            _ => (512, 1024, None),
        };
        ContainerDefinition {
            name: self.name().to_string(),
            image: self.image(),
            memory,
            cpu,
            essential,
            environment: self.environment(),
            port_mappings: vec![PortMapping {
                container_port: self.port(),
            }],
        }
    }
}

impl fmt::Display for LoggingComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
