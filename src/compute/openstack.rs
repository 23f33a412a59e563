//! OpenStack compute client
//!
//! Talks to Nova (and optionally Glance and Neutron) over REST with a
//! pre-issued token.
//! https://docs.openstack.org/api-ref/compute/

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

use super::{ComputeApi, CreateServerRequest, Flavor, Image, Network, Nics, Server};
use crate::TesterError;

const USER_AGENT: &str = "nova-servertester";

/// Header selecting the compute API microversion
const MICROVERSION_HEADER: &str = "X-OpenStack-Nova-API-Version";

/// First microversion accepting `"networks": "auto"`
const AUTO_NETWORK_MICROVERSION: &str = "2.37";

#[derive(Debug, Deserialize)]
struct ImageList {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct ImageEnvelope {
    image: Image,
}

#[derive(Debug, Deserialize)]
struct NetworkEnvelope {
    network: Network,
}

#[derive(Debug, Deserialize)]
struct NetworkList {
    networks: Vec<Network>,
}

/// Network as returned by the compute `os-networks` proxy
#[derive(Debug, Deserialize)]
struct ComputeNetwork {
    id: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct ComputeNetworkEnvelope {
    network: ComputeNetwork,
}

#[derive(Debug, Deserialize)]
struct FlavorList {
    flavors: Vec<Flavor>,
}

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Debug, Deserialize)]
struct ConsoleOutput {
    #[serde(default)]
    output: String,
}

/// Nova REST client
pub struct NovaClient {
    client: Client,
    token: String,
    compute_url: String,
    image_url: Option<String>,
    network_url: Option<String>,
}

impl NovaClient {
    /// Create a client for a compute endpoint
    ///
    /// `timeout` bounds every single HTTP request.
    pub fn new(
        token: impl Into<String>,
        compute_url: &str,
        timeout: Duration,
    ) -> Result<Self, TesterError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            token: token.into(),
            compute_url: trim_url(compute_url),
            image_url: None,
            network_url: None,
        })
    }

    /// Resolve images through Glance instead of the compute image proxy
    pub fn with_image_endpoint(mut self, url: &str) -> Self {
        self.image_url = Some(trim_url(url));
        self
    }

    /// Resolve networks through Neutron instead of the compute network proxy
    pub fn with_network_endpoint(mut self, url: &str) -> Self {
        self.network_url = Some(trim_url(url));
        self
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json")
    }

    /// Turn a non-success status into an API error
    async fn check(response: Response) -> Result<Response, TesterError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(TesterError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// GET a JSON document; `None` when the resource does not exist
    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, TesterError> {
        let response = self.request(Method::GET, url).send().await?;

        // Glance answers 400 for ids that are not UUIDs
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST
        ) {
            return Ok(None);
        }

        let response = Self::check(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn find_image_glance(
        &self,
        image_url: &str,
        reference: &str,
    ) -> Result<Option<Image>, TesterError> {
        let url = format!("{}/v2/images/{}", image_url, reference);
        if let Some(image) = self.get_optional::<Image>(&url).await? {
            return Ok(Some(image));
        }

        let url = format!("{}/v2/images", image_url);
        let response = self
            .request(Method::GET, &url)
            .query(&[("name", reference)])
            .send()
            .await?;
        let list: ImageList = Self::check(response).await?.json().await?;
        Ok(list.images.into_iter().next())
    }

    async fn find_network_neutron(
        &self,
        network_url: &str,
        reference: &str,
    ) -> Result<Option<Network>, TesterError> {
        let url = format!("{}/v2.0/networks/{}", network_url, reference);
        if let Some(envelope) = self.get_optional::<NetworkEnvelope>(&url).await? {
            return Ok(Some(envelope.network));
        }

        let url = format!("{}/v2.0/networks", network_url);
        let response = self
            .request(Method::GET, &url)
            .query(&[("name", reference)])
            .send()
            .await?;
        let list: NetworkList = Self::check(response).await?.json().await?;
        Ok(list.networks.into_iter().next())
    }

    fn create_body(request: &CreateServerRequest) -> Value {
        let mut server = Map::new();
        server.insert("name".to_string(), json!(request.name));
        server.insert("imageRef".to_string(), json!(request.image_id));
        server.insert("flavorRef".to_string(), json!(request.flavor_id));
        server.insert("metadata".to_string(), json!(request.metadata));

        match &request.nics {
            Nics::Unspecified => {}
            Nics::Auto => {
                server.insert("networks".to_string(), json!("auto"));
            }
            Nics::Network(id) => {
                server.insert("networks".to_string(), json!([{ "uuid": id }]));
            }
        }
        if let Some(userdata) = &request.userdata {
            server.insert("user_data".to_string(), json!(BASE64.encode(userdata)));
        }
        if let Some(az) = &request.availability_zone {
            server.insert("availability_zone".to_string(), json!(az));
        }

        json!({ "server": server })
    }
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[async_trait]
impl ComputeApi for NovaClient {
    fn auth_token(&self) -> &str {
        &self.token
    }

    fn endpoint(&self) -> &str {
        &self.compute_url
    }

    async fn find_image(&self, reference: &str) -> Result<Image, TesterError> {
        let image = match &self.image_url {
            Some(image_url) => self.find_image_glance(image_url, reference).await?,
            None => {
                let url = format!("{}/images/{}", self.compute_url, reference);
                self.get_optional::<ImageEnvelope>(&url)
                    .await?
                    .map(|envelope| envelope.image)
            }
        };
        image.ok_or_else(|| TesterError::not_found("Image", reference))
    }

    async fn find_network(&self, reference: &str) -> Result<Network, TesterError> {
        let network = match &self.network_url {
            Some(network_url) => self.find_network_neutron(network_url, reference).await?,
            None => {
                let url = format!("{}/os-networks/{}", self.compute_url, reference);
                self.get_optional::<ComputeNetworkEnvelope>(&url)
                    .await?
                    .map(|envelope| Network {
                        id: envelope.network.id,
                        name: envelope.network.label,
                    })
            }
        };
        network.ok_or_else(|| TesterError::not_found("Network", reference))
    }

    async fn find_flavor(&self, name: &str) -> Result<Flavor, TesterError> {
        let url = format!("{}/flavors/detail", self.compute_url);
        let response = self.request(Method::GET, &url).send().await?;
        let list: FlavorList = Self::check(response).await?.json().await?;

        let by_name = list.flavors.iter().position(|f| f.name == name);
        let by_id = || list.flavors.iter().position(|f| f.id == name);
        match by_name.or_else(by_id) {
            Some(idx) => Ok(list.flavors[idx].clone()),
            None => Err(TesterError::not_found("Flavor", name)),
        }
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server, TesterError> {
        let url = format!("{}/servers", self.compute_url);
        let mut builder = self
            .request(Method::POST, &url)
            .json(&Self::create_body(request));
        if request.nics == Nics::Auto {
            builder = builder.header(MICROVERSION_HEADER, AUTO_NETWORK_MICROVERSION);
        }

        let response = Self::check(builder.send().await?).await?;
        let mut server = response.json::<ServerEnvelope>().await?.server;
        if server.name.is_empty() {
            server.name = request.name.clone();
        }
        Ok(server)
    }

    async fn get_server(&self, id: &str) -> Result<Server, TesterError> {
        let url = format!("{}/servers/{}", self.compute_url, id);
        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TesterError::not_found("Server", id));
        }
        let envelope: ServerEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.server)
    }

    async fn delete_server(&self, id: &str) -> Result<(), TesterError> {
        let url = format!("{}/servers/{}", self.compute_url, id);
        let response = self.request(Method::DELETE, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Server {} already gone", id);
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn get_console_output(&self, id: &str) -> Result<String, TesterError> {
        let url = format!("{}/servers/{}/action", self.compute_url, id);
        let response = self
            .request(Method::POST, &url)
            .json(&json!({ "os-getConsoleOutput": {} }))
            .send()
            .await?;
        let console: ConsoleOutput = Self::check(response).await?.json().await?;
        Ok(console.output)
    }
}
