//! Shapes of the gateway product's custom resources.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::{
	convert::{
		as_bool, as_bool_value, as_map, as_string, as_string_list, as_u32, ConversionError,
		CustomResourceShape, FieldMapping,
	},
	path::FieldPath,
};

/// Values the chart uses when nothing overrides them.
pub mod defaults {
	pub const GATEWAY_PROXY_NAME: &str = "gateway-proxy";
	pub const GATEWAY_BIND_ADDRESS: &str = "::";
	pub const HTTP_BIND_PORT: u32 = 8080;
	pub const HTTPS_BIND_PORT: u32 = 8443;
}

/// Reference to another resource by name and namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceRef {
	pub name: String,
	pub namespace: String,
}

impl ResourceRef {
	pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			namespace: namespace.into(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpGateway {
	/// Empty means every virtual service is bound.
	pub virtual_services: Vec<ResourceRef>,
}

/// A listener on a gateway proxy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gateway {
	pub bind_address: String,
	pub bind_port: u32,
	pub ssl: bool,
	pub proxy_names: Vec<String>,
	/// `None` when the wrapper is not written at all.
	pub use_proxy_proto: Option<bool>,
	pub http_gateway: Option<HttpGateway>,
	pub tcp_gateway: Option<Value>,
	pub options: Option<Value>,
}

fn gateway_bind_address(g: &mut Gateway, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	g.bind_address = as_string(v, p)?;
	Ok(())
}

fn gateway_bind_port(g: &mut Gateway, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	g.bind_port = as_u32(v, p)?;
	Ok(())
}

fn gateway_ssl(g: &mut Gateway, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	g.ssl = as_bool(v, p)?;
	Ok(())
}

fn gateway_proxy_names(g: &mut Gateway, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	g.proxy_names = as_string_list(v, p)?;
	Ok(())
}

fn gateway_use_proxy_proto(
	g: &mut Gateway,
	v: &Value,
	p: &FieldPath,
) -> Result<(), ConversionError> {
	g.use_proxy_proto = Some(as_bool_value(v, p)?);
	Ok(())
}

fn gateway_http(g: &mut Gateway, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	let map = as_map(v, p)?;
	let mut http = HttpGateway::default();
	if let Some(list) = map.get("virtualServices").filter(|v| !v.is_null()) {
		let path = p.key("virtualServices");
		let items = list.as_array().ok_or_else(|| ConversionError::WrongType {
			path: path.clone(),
			expected: "sequence",
			found: crate::document::type_name(list),
		})?;
		for (i, item) in items.iter().enumerate() {
			let item_path = path.index(i);
			let item = as_map(item, &item_path)?;
			let field = |key: &str| -> Result<String, ConversionError> {
				item.get(key).map_or_else(
					|| Ok(String::new()),
					|v| as_string(v, &item_path.key(key)),
				)
			};
			http.virtual_services.push(ResourceRef {
				name: field("name")?,
				namespace: field("namespace")?,
			});
		}
	}
	g.http_gateway = Some(http);
	Ok(())
}

fn gateway_tcp(g: &mut Gateway, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	as_map(v, p)?;
	g.tcp_gateway = Some(v.clone());
	Ok(())
}

fn gateway_options(g: &mut Gateway, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	as_map(v, p)?;
	g.options = Some(v.clone());
	Ok(())
}

const GATEWAY_FIELDS: &[FieldMapping<Gateway>] = &[
	FieldMapping::required("bindAddress", gateway_bind_address),
	FieldMapping::required("bindPort", gateway_bind_port),
	FieldMapping::optional("ssl", gateway_ssl),
	FieldMapping::optional("proxyNames", gateway_proxy_names),
	FieldMapping::optional("useProxyProto", gateway_use_proxy_proto),
	FieldMapping::optional("httpGateway", gateway_http),
	FieldMapping::optional("tcpGateway", gateway_tcp),
	FieldMapping::optional("options", gateway_options),
];

impl CustomResourceShape for Gateway {
	const KIND: &'static str = "Gateway";

	fn fields() -> &'static [FieldMapping<Self>] {
		GATEWAY_FIELDS
	}
}

/// Installation-wide settings of the control plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
	pub discovery_namespace: String,
	pub refresh_rate: Option<String>,
	pub xds_bind_addr: Option<String>,
	pub proxy_validation_server_addr: Option<String>,
	pub always_accept: Option<bool>,
	pub read_gateways_from_all_namespaces: bool,
	pub invalid_route_response_code: Option<u32>,
	pub invalid_route_response_body: Option<String>,
	/// Config sources that are enabled, e.g. `kubernetesConfigSource`.
	pub sources: BTreeSet<String>,
	pub discovery: Option<Value>,
}

fn settings_discovery_namespace(
	s: &mut Settings,
	v: &Value,
	p: &FieldPath,
) -> Result<(), ConversionError> {
	s.discovery_namespace = as_string(v, p)?;
	Ok(())
}

fn settings_refresh_rate(s: &mut Settings, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	s.refresh_rate = Some(as_string(v, p)?);
	Ok(())
}

fn settings_xds_bind_addr(s: &mut Settings, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	s.xds_bind_addr = Some(as_string(v, p)?);
	Ok(())
}

fn settings_validation_addr(
	s: &mut Settings,
	v: &Value,
	p: &FieldPath,
) -> Result<(), ConversionError> {
	s.proxy_validation_server_addr = Some(as_string(v, p)?);
	Ok(())
}

fn settings_always_accept(s: &mut Settings, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	s.always_accept = Some(as_bool_value(v, p)?);
	Ok(())
}

fn settings_all_namespaces(
	s: &mut Settings,
	v: &Value,
	p: &FieldPath,
) -> Result<(), ConversionError> {
	s.read_gateways_from_all_namespaces = as_bool(v, p)?;
	Ok(())
}

fn settings_response_code(s: &mut Settings, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	s.invalid_route_response_code = Some(as_u32(v, p)?);
	Ok(())
}

fn settings_response_body(s: &mut Settings, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	s.invalid_route_response_body = Some(as_string(v, p)?);
	Ok(())
}

// Sources are marker objects; their presence is what counts.
fn settings_source(s: &mut Settings, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	as_map(v, p)?;
	if let Some(crate::path::PathSegment::Key(name)) = p.segments().last() {
		s.sources.insert(name.clone());
	}
	Ok(())
}

fn settings_discovery(s: &mut Settings, v: &Value, p: &FieldPath) -> Result<(), ConversionError> {
	as_map(v, p)?;
	s.discovery = Some(v.clone());
	Ok(())
}

const SETTINGS_FIELDS: &[FieldMapping<Settings>] = &[
	FieldMapping::required("discoveryNamespace", settings_discovery_namespace),
	FieldMapping::optional("refreshRate", settings_refresh_rate),
	FieldMapping::optional("gloo.xdsBindAddr", settings_xds_bind_addr),
	FieldMapping::optional(
		"gloo.invalidConfigPolicy.invalidRouteResponseCode",
		settings_response_code,
	),
	FieldMapping::optional(
		"gloo.invalidConfigPolicy.invalidRouteResponseBody",
		settings_response_body,
	),
	FieldMapping::optional(
		"gateway.readGatewaysFromAllNamespaces",
		settings_all_namespaces,
	),
	FieldMapping::optional(
		"gateway.validation.proxyValidationServerAddr",
		settings_validation_addr,
	),
	FieldMapping::optional("gateway.validation.alwaysAccept", settings_always_accept),
	FieldMapping::optional("kubernetesArtifactSource", settings_source),
	FieldMapping::optional("kubernetesConfigSource", settings_source),
	FieldMapping::optional("kubernetesSecretSource", settings_source),
	FieldMapping::optional("discovery", settings_discovery),
];

impl CustomResourceShape for Settings {
	const KIND: &'static str = "Settings";

	fn fields() -> &'static [FieldMapping<Self>] {
		SETTINGS_FIELDS
	}
}
