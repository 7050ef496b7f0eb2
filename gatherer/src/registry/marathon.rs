use super::{
    Registry,
    RegistryError,
};
use crate::metrics::InstanceDescriptor;
use futures::{
    stream,
    StreamExt,
};
use reqwest::Client as HttpClient;
use serde::{
    de::DeserializeOwned,
    Deserialize,
};
use std::{
    future::Future,
    pin::Pin,
};
use url::Url;

#[derive(Debug, Deserialize)]
struct AppList {
    #[serde(default)]
    apps: Vec<AppSummary>,
}

#[derive(Debug, Deserialize)]
struct AppSummary {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AppResponse {
    app: AppDetail,
}

#[derive(Debug, Deserialize)]
struct AppDetail {
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    id: String,
    app_id: String,
    host: String,
    #[serde(default)]
    ports: Vec<u16>,
}

/// Lists apps by label through the Marathon REST API, then resolves the
/// tasks of every app with at most `max_workers` requests in flight.
pub struct MarathonRegistry {
    base_url: Url,
    client: HttpClient,
    max_workers: usize,
}

impl MarathonRegistry {
    pub fn new(base_url: Url, client: HttpClient, max_workers: usize) -> Result<Self, RegistryError> {
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidAddress(base_url.to_string()));
        }
        debug!(marathon = %base_url, "Configuring Marathon client");
        Ok(Self {
            base_url,
            client,
            max_workers: max_workers.max(1),
        })
    }

    fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["v2", "apps"]).extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RegistryError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| RegistryError::Http {
            url: url.to_string(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| RegistryError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn app_tasks(&self, app_id: &str) -> Result<Vec<InstanceDescriptor>, RegistryError> {
        debug!(app_id, "Fetching tasks");
        let url = self.endpoint(app_id.split('/').filter(|segment| !segment.is_empty()));
        let AppResponse { app } = self.get_json(url).await?;

        app.tasks
            .into_iter()
            .map(|task| {
                debug!(app_id, task_id = %task.id, "Adding task");
                // The last port is the admin port.
                let Some(&port) = task.ports.last() else {
                    warn!(app_id, "Service has no ports defined, skipping");
                    return Err(RegistryError::NoPorts(app_id.to_string()));
                };
                Ok(InstanceDescriptor::new(task.app_id, task.id, task.host, port))
            })
            .collect()
    }
}

impl Registry for MarathonRegistry {
    fn list_instances<'a>(
        &'a self,
        label: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<InstanceDescriptor>, RegistryError>> + Send + 'a>> {
        Box::pin(async move {
            let mut url = self.endpoint(std::iter::empty());
            url.query_pairs_mut().append_pair("label", label);
            let AppList { apps } = self.get_json(url).await?;
            info!(apps = apps.len(), label, "Fetched apps");

            let instances = stream::iter(apps)
                .map(|app| async move {
                    let result = self.app_tasks(&app.id).await;
                    (app.id, result)
                })
                .buffer_unordered(self.max_workers)
                .filter_map(|(app_id, result)| async move {
                    match result {
                        Ok(instances) => Some(instances),
                        Err(e) => {
                            error!(app_id = %app_id, error = %e, "Error getting app details");
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .flatten()
                .collect::<Vec<_>>();

            info!(instances = instances.len(), "Resolved instances");
            Ok(instances)
        })
    }

    fn name(&self) -> &'static str {
        "marathon"
    }
}
