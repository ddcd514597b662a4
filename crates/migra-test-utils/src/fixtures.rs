//! Canned legacy database, command runner and gateway wiring for tests

use crate::runner::{ok, FakeRunner};
use crate::source_db::{row, FakeSourceDb};
use migra_gateway::{GatewayConfig, LegacyDbCredentials, StaticSecrets, ToolGateway};
use std::sync::{Arc, Once};

pub const ROOT_PASSWORD: &str = "cloudsql-root-pw";
pub const INSTANCE_IP: &str = "10.20.0.5";

pub const USERS_DDL: &str =
    "CREATE TABLE `users` (\n  `id` int NOT NULL,\n  `email` varchar(255) NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=MyISAM DEFAULT CHARSET=utf8mb4";
pub const ORDERS_DDL: &str =
    "CREATE TABLE `orders` (\n  `id` int NOT NULL,\n  `user_id` int NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";
pub const ORDER_TOTALS_DDL: &str =
    "CREATE ALGORITHM=UNDEFINED DEFINER=`admin`@`%` SQL SECURITY DEFINER VIEW `order_totals` AS select `orders`.`user_id` AS `user_id`,count(0) AS `n` from `orders` group by `orders`.`user_id`";
/// View whose definer is written without quotes
pub const BIG_SPENDERS_DDL: &str =
    "CREATE ALGORITHM=UNDEFINED DEFINER=reporting@localhost SQL SECURITY DEFINER VIEW `big_spenders` AS select `order_totals`.`user_id` AS `user_id` from `order_totals` where `order_totals`.`n` > 100";

/// Row counts printed by the validation script when source and target agree
pub const MATCHING_COUNTS: &str = "users 10 10\norders 1052 1052\n";
/// Row counts with two rows missing from `orders` on the target
pub const MISMATCHED_COUNTS: &str = "users 10 10\norders 1052 1050\n";

pub fn legacy_credentials() -> LegacyDbCredentials {
    LegacyDbCredentials {
        host: "10.0.0.7".to_string(),
        user: "migrator".to_string(),
        password: "legacy-pw".to_string(),
        database: "legacy".to_string(),
    }
}

/// Legacy database with four tables, one MyISAM and two views with definers
pub fn standard_source() -> FakeSourceDb {
    FakeSourceDb::new()
        .on(
            migra_gateway::source_db::LIST_TABLES_SQL,
            vec![row(&["users"]), row(&["orders"]), row(&["order_totals"]), row(&["big_spenders"])],
        )
        .on("SHOW CREATE TABLE `users`", vec![row(&["users", USERS_DDL])])
        .on("SHOW CREATE TABLE `orders`", vec![row(&["orders", ORDERS_DDL])])
        .on("SHOW CREATE TABLE `order_totals`", vec![row(&["order_totals", ORDER_TOTALS_DDL])])
        .on("SHOW CREATE TABLE `big_spenders`", vec![row(&["big_spenders", BIG_SPENDERS_DDL])])
        .on("information_schema.TABLES", vec![row(&["legacy", "80.000000"])])
}

/// Runner answering every external program the migration touches
pub fn standard_runner() -> FakeRunner {
    FakeRunner::new()
        .on("terraform", ok("Apply complete! Resources: 3 added, 0 changed, 0 destroyed.\n"))
        .on_matching(
            "gcloud",
            "describe",
            ok(&format!(r#"{{"ipAddresses":[{{"ipAddress":"{INSTANCE_IP}","type":"PRIVATE"}}]}}"#)),
        )
        .on("mydumper", ok("dump finished\n"))
        .on("myloader", ok("load finished\n"))
        .on("python3", ok(MATCHING_COUNTS))
}

/// Gateway over `runner` and [`standard_source`] with legacy credentials and the Cloud SQL root secret
pub fn fake_gateway(runner: Arc<FakeRunner>) -> Arc<ToolGateway> {
    fake_gateway_with(runner, Arc::new(standard_source()))
}

pub fn fake_gateway_with(runner: Arc<FakeRunner>, source: Arc<FakeSourceDb>) -> Arc<ToolGateway> {
    let config = GatewayConfig::default().with_project("migra-test");
    let secrets = StaticSecrets::new().with(config.cloud_sql_root_password_secret.clone(), ROOT_PASSWORD);
    Arc::new(
        ToolGateway::with_credentials(config, runner, Arc::new(secrets), Some(legacy_credentials()))
            .with_source_database(source),
    )
}

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("migra_core=debug,migra_gateway=debug")
            .with_test_writer()
            .try_init();
    });
}
