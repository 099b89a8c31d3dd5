//! Deterministic mock contributions for demos and tests.

use hybridci_shared::{Author, ConfigSource, RawMetrics};

use crate::input::ContributionInput;

struct Template {
    slug: &'static str,
    name: &'static str,
    category: &'static str,
    config_type: &'static str,
    author: &'static str,
    tags: &'static [&'static str],
    description: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        slug: "github-actions-node",
        name: "GitHub Actions Node Pipeline",
        category: "ci-cd",
        config_type: "workflow",
        author: "octo-devops",
        tags: &["github-actions", "node", "ci"],
        description: "Lint, test and build Node projects on every push",
    },
    Template {
        slug: "k8s-blue-green",
        name: "Kubernetes Blue/Green Deploy",
        category: "deployment",
        config_type: "template",
        author: "kubecraft",
        tags: &["kubernetes", "deploy", "blue-green"],
        description: "Zero-downtime rollouts with automatic rollback",
    },
    Template {
        slug: "pytest-matrix",
        name: "Pytest Matrix Runner",
        category: "testing",
        config_type: "workflow",
        author: "pyforge",
        tags: &["python", "pytest", "matrix"],
        description: "Runs the test suite across interpreter versions",
    },
    Template {
        slug: "trivy-scan",
        name: "Trivy Container Scan",
        category: "security",
        config_type: "tool",
        author: "secops-guild",
        tags: &["containers", "trivy", "cve"],
        description: "Fails the build on critical image vulnerabilities",
    },
    Template {
        slug: "prometheus-alerts",
        name: "Prometheus Alert Pack",
        category: "monitoring",
        config_type: "integration",
        author: "observa",
        tags: &["prometheus", "alerts"],
        description: "Alert rules for build agents and queues",
    },
    Template {
        slug: "terraform-plan",
        name: "Terraform Plan Gate",
        category: "infrastructure",
        config_type: "plugin",
        author: "infra-collective",
        tags: &["terraform", "iac", "review"],
        description: "Posts plan diffs and blocks unreviewed applies",
    },
    Template {
        slug: "slack-notify",
        name: "Slack Build Notifier",
        category: "notifications",
        config_type: "integration",
        author: "octo-devops",
        tags: &["slack", "notifications"],
        description: "Reports pipeline status to a channel",
    },
    Template {
        slug: "jenkins-bridge",
        name: "Jenkins Bridge",
        category: "ci-cd",
        config_type: "integration",
        author: "legacy-labs",
        tags: &["jenkins", "hybrid", "ci"],
        description: "Relays Jenkins jobs into the hybrid dashboard",
    },
];

/// Build `count` contributions, cycling through a fixed set of templates.
///
/// The same `count` always yields the same inputs; every one is valid.
pub fn mock_contributions(count: usize) -> Vec<ContributionInput> {
    (0..count).map(mock_contribution).collect()
}

fn mock_contribution(index: usize) -> ContributionInput {
    let template = &TEMPLATES[index % TEMPLATES.len()];
    let round = index / TEMPLATES.len();
    let id = if round == 0 {
        template.slug.to_string()
    } else {
        format!("{}-{}", template.slug, round + 1)
    };

    // Spread the numbers so every sort order produces a distinct ranking.
    let seed = (index as u64 * 7919) % 997;
    let stars = seed % 250;
    let downloads = (seed * 13) % 2_000;

    ContributionInput {
        yaml_content: manifest(&id, template),
        source: ConfigSource {
            repo_url: format!("https://github.com/{}/{id}", template.author),
            full_name: Some(format!("{}/{id}", template.author)),
            path: "hybrid-config.yaml".into(),
            branch: "main".into(),
        },
        author: Author {
            login: template.author.into(),
            name: None,
            avatar_url: Some(format!("https://github.com/{}.png", template.author)),
            profile_url: Some(format!("https://github.com/{}", template.author)),
        },
        metrics: RawMetrics {
            stars: Some(stars),
            forks: Some(stars / 4),
            issues: Some(seed % 17),
            watchers: Some(stars / 2),
            downloads: Some(downloads),
        },
        license: Some("MIT".into()),
        is_featured: index % 5 == 0,
        quality_score: 0.5 + (seed % 50) as f64 / 100.0,
        id,
    }
}

fn manifest(id: &str, template: &Template) -> String {
    format!(
        "type: {config_type}\n\
         metadata:\n  \
           id: {id}\n  \
           name: \"{name}\"\n  \
           description: \"{description}\"\n  \
           category: {category}\n  \
           version: \"1.{minor}.0\"\n  \
           author: {author}\n  \
           tags: [{tags}]\n",
        config_type = template.config_type,
        name = template.name,
        description = template.description,
        category = template.category,
        minor = id.len() % 10,
        author = template.author,
        tags = template.tags.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery_chain::ConfigDiscoveryChain;

    #[test]
    fn deterministic_and_unique() {
        let a = mock_contributions(20);
        let b = mock_contributions(20);
        assert_eq!(a, b);

        let mut ids: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        assert_eq!(a[TEMPLATES.len()].id, "github-actions-node-2");
    }

    #[tokio::test]
    async fn every_mock_passes_the_chain() {
        let chain = ConfigDiscoveryChain::new().unwrap();
        let batch = chain.process_batch(&mock_contributions(16)).await;
        assert!(batch.failed.is_empty(), "{:?}", batch.failed);

        let record = &batch.successful[1].record;
        assert_eq!(record.id, "k8s-blue-green");
        assert_eq!(record.tags, vec!["kubernetes", "deploy", "blue-green"]);
        assert_eq!(record.license.as_deref(), Some("MIT"));
    }
}
