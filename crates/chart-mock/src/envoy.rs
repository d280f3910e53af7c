//! Envoy bootstrap carried by each proxy's config map.

use serde_json::{json, Value};

pub const ADMIN_PORT: i64 = 19000;
pub const READ_CONFIG_PORT: i64 = 8082;

const HTTP_CONNECTION_MANAGER: &str =
	"type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const ADMIN_CLUSTER: &str = "admin_port_cluster";

#[derive(Debug, Clone)]
pub struct Bootstrap<'a> {
	pub namespace: &'a str,
	pub proxy: &'a str,
	pub xds_port: i64,
	pub stats_port: i64,
	/// Expose a read-only subset of the admin API.
	pub read_config: bool,
	/// Port of the access log service, when one is deployed.
	pub access_logger: Option<i64>,
	/// HTTP tracer, copied verbatim from the proxy's `tracing.provider`.
	pub tracing_provider: Option<&'a Value>,
	/// Extra clusters the tracer reports to, from `tracing.cluster`.
	pub tracing_clusters: &'a [Value],
}

fn cluster(name: &str, address: &str, port: i64, kind: &str, http2: bool) -> Value {
	let mut cluster = json!({
		"name": name,
		"connect_timeout": "5.000s",
		"type": kind,
		"load_assignment": {
			"cluster_name": name,
			"endpoints": [{
				"lb_endpoints": [{
					"endpoint": {"address": {"socket_address": {"address": address, "port_value": port}}}
				}]
			}]
		}
	});
	if http2 {
		cluster["http2_protocol_options"] = json!({});
	}
	cluster
}

fn admin_route(prefix: &str, rewrite: Option<&str>) -> Value {
	let mut route = json!({"cluster": ADMIN_CLUSTER});
	if let Some(rewrite) = rewrite {
		route["prefix_rewrite"] = json!(rewrite);
	}
	json!({"match": {"prefix": prefix}, "route": route})
}

fn listener(name: &str, port: i64, routes: Vec<Value>) -> Value {
	json!({
		"name": name,
		"address": {"socket_address": {"address": "0.0.0.0", "port_value": port}},
		"filter_chains": [{
			"filters": [{
				"name": "envoy.filters.network.http_connection_manager",
				"typed_config": {
					"@type": HTTP_CONNECTION_MANAGER,
					"codec_type": "AUTO",
					"stat_prefix": name,
					"route_config": {
						"name": format!("{name}_route"),
						"virtual_hosts": [{
							"name": format!("{name}_host"),
							"domains": ["*"],
							"routes": routes
						}]
					},
					"http_filters": [{"name": "envoy.filters.http.router"}]
				}
			}]
		}]
	})
}

impl Bootstrap<'_> {
	pub fn to_value(&self) -> Value {
		let xds_host = format!("gloo.{}.svc.cluster.local", self.namespace);
		let xds_cluster = format!("{xds_host}:{}", self.xds_port);

		let mut clusters = vec![
			cluster(&xds_cluster, &xds_host, self.xds_port, "STRICT_DNS", true),
			cluster(ADMIN_CLUSTER, "127.0.0.1", ADMIN_PORT, "STATIC", false),
		];
		if let Some(port) = self.access_logger {
			let host = format!("gateway-proxy-access-logger.{}.svc.cluster.local", self.namespace);
			clusters.push(cluster("access_log_cluster", &host, port, "STRICT_DNS", true));
		}
		clusters.extend(self.tracing_clusters.iter().cloned());

		let mut listeners = vec![listener(
			"prometheus_listener",
			self.stats_port,
			vec![admin_route("/metrics", Some("/stats/prometheus"))],
		)];
		if self.read_config {
			listeners.push(listener(
				"read_config_listener",
				READ_CONFIG_PORT,
				["/stats", "/ready", "/config_dump"]
					.into_iter()
					.map(|prefix| admin_route(prefix, None))
					.collect(),
			));
		}

		let mut bootstrap = json!({
			"node": {
				"cluster": "gateway",
				"id": format!("{}~{}", self.proxy, self.namespace),
				"metadata": {"role": format!("{}~{}", self.namespace, self.proxy)}
			},
			"static_resources": {"listeners": listeners, "clusters": clusters},
			"dynamic_resources": {
				"ads_config": {
					"api_type": "GRPC",
					"grpc_services": [{"envoy_grpc": {"cluster_name": xds_cluster}}]
				},
				"cds_config": {"ads": {}},
				"lds_config": {"ads": {}}
			},
			"admin": {
				"access_log_path": "/dev/null",
				"address": {"socket_address": {"address": "127.0.0.1", "port_value": ADMIN_PORT}}
			}
		});
		if let Some(provider) = self.tracing_provider {
			bootstrap["tracing"] = json!({"http": provider});
		}
		bootstrap
	}
}
