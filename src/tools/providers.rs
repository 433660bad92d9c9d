use serde::Serialize;

use crate::config::RoutingConfig;
use crate::providers::{Availability, ProviderId, Requirement};

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub available: bool,
    /// How availability is decided: the credential names, or the local endpoint.
    pub requires: String,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
    pub text_order: Vec<ProviderId>,
    pub code_order: Vec<ProviderId>,
    pub vision_order: Vec<ProviderId>,
}

impl ProvidersResponse {
    pub fn new(availability: &Availability, routing: &RoutingConfig) -> Self {
        let providers = ProviderId::ALL
            .into_iter()
            .map(|id| ProviderInfo {
                name: id.as_str(),
                available: availability.get(&id).copied().unwrap_or(false),
                requires: match id.requirement() {
                    Requirement::Credential(keys) => keys.join(" or "),
                    Requirement::LocalEndpoint {
                        override_env,
                        default_url,
                    } => format!("{override_env} or a server at {default_url}"),
                },
            })
            .collect();
        Self {
            providers,
            text_order: routing.text_order.clone(),
            code_order: routing.code_order.clone(),
            vision_order: routing.vision_order.clone(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from("| provider | available | requires |\n|---|---|---|\n");
        for p in &self.providers {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                p.name,
                if p.available { "yes" } else { "no" },
                p.requires
            ));
        }
        let join = |ids: &[ProviderId]| {
            ids.iter().map(ProviderId::as_str).collect::<Vec<_>>().join(" > ")
        };
        out.push_str(&format!("\ntext: {}\n", join(&self.text_order)));
        out.push_str(&format!("code: {}\n", join(&self.code_order)));
        out.push_str(&format!("vision: {}\n", join(&self.vision_order)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::availability_of;

    #[test]
    fn markdown_lists_every_provider() {
        let resp = ProvidersResponse::new(
            &availability_of(&[ProviderId::Groq]),
            &RoutingConfig::default(),
        );
        let md = resp.to_markdown();
        for id in ProviderId::ALL {
            assert!(md.contains(&format!("| {} |", id.as_str())), "missing {id}");
        }
        assert!(md.contains("| groq | yes | GROQ_API_KEY |"));
        assert!(md.contains("V0_API_KEY or V0_DEV_API_KEY"));
    }
}
