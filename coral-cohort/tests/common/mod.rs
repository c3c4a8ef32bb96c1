//! Shared fixture: a temporary registry plus an entity database `publicdb` with the
//! `tissue`, `cellline` and `public` schemas attached.

#![allow(dead_code)]

use coral_cohort::{CohortService, Params};
use coral_common::config::{AttachConfig, ClusterConfig, DatabaseConfig, TomlConfig};
use coral_common::db::Cohort;
use tempfile::TempDir;

pub const DATABASE: &str = "publicdb";

/// Tissue rows: name, gender, age, bmi, treatment
pub const TISSUES: &[(&str, Option<&str>, Option<i64>, Option<f64>, Option<&str>)] = &[
    ("T01", Some("female"), Some(2), Some(20.0), Some(r#"[{"REGIMEN_NUMBER":1,"AGENT":"Cisplatin"}]"#)),
    (
        "T02",
        Some("female"),
        Some(5),
        Some(22.5),
        Some(r#"[{"REGIMEN_NUMBER":1,"AGENT":"Cisplatin"},{"REGIMEN_NUMBER":1,"AGENT":"Paclitaxel"}]"#),
    ),
    ("T03", Some("male"), Some(10), Some(30.0), None),
    ("T04", Some("male"), Some(1), Some(18.0), Some("[]")),
    ("T05", Some("female"), Some(3), Some(35.0), Some(r#"[{"REGIMEN_NUMBER":2,"AGENT":"Cisplatin"}]"#)),
    ("T06", None, Some(8), Some(25.0), None),
    ("T07", Some("female"), Some(9), None, None),
    ("T08", Some("male"), Some(12), Some(27.0), None),
    ("T09", Some("female"), None, Some(21.0), None),
    ("T10", Some("male"), Some(100), Some(31.0), None),
];

pub struct Fixture {
    pub service: CohortService,
    pub config: TomlConfig,
    _dir: TempDir,
}

pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().copied().collect()
}

fn database(dir: &TempDir, name: &str, schemas: &[&str]) -> DatabaseConfig {
    DatabaseConfig {
        name: name.to_string(),
        path: dir.path().join(format!("{}.db", name)),
        attach: schemas
            .iter()
            .map(|schema| AttachConfig {
                schema: schema.to_string(),
                path: dir.path().join(format!("{}.db", schema)),
            })
            .collect(),
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE tissue.tdp_tissue (tissuename TEXT PRIMARY KEY, gender TEXT, age INTEGER, bmi REAL, treatment TEXT)",
    "CREATE TABLE tissue.tdp_expression (tissuename TEXT, ensg TEXT, tpm REAL)",
    "CREATE TABLE tissue.tdp_panelassignment (tissuename TEXT, panel TEXT)",
    "CREATE TABLE cellline.tdp_cellline (celllinename TEXT PRIMARY KEY, organ TEXT)",
    "CREATE TABLE cellline.tdp_depletionscore (celllinename TEXT, ensg TEXT, depletionscreen TEXT, rsa REAL)",
    "CREATE TABLE public.tdp_gene (ensg TEXT PRIMARY KEY, symbol TEXT, species TEXT)",
    "INSERT INTO public.tdp_gene VALUES ('ENSG00000141510', 'TP53', 'human'), ('ENSMUSG0001', 'Trp53', 'mouse')",
    "INSERT INTO tissue.tdp_expression VALUES
        ('T01', 'ENSG00000141510', 1.5), ('T02', 'ENSG00000141510', 7.0),
        ('T03', 'ENSG00000141510', 12.0), ('T08', 'ENSG00000141510', 3.0),
        ('T01', 'ENSMUSG0001', 99.0)",
    "INSERT INTO tissue.tdp_panelassignment VALUES
        ('T01', 'TCGA normals'), ('T03', 'TCGA normals'), ('T03', 'TCGA normals'), ('T05', 'other')",
    "INSERT INTO cellline.tdp_cellline VALUES ('HELA', 'cervix'), ('A549', 'lung'), ('MCF7', 'breast')",
    "INSERT INTO cellline.tdp_depletionscore VALUES
        ('HELA', 'ENSG00000141510', 'Drive', -2.5), ('A549', 'ENSG00000141510', 'Drive', 0.5),
        ('MCF7', 'ENSG00000141510', 'Avana', -4.0)",
];

impl Fixture {
    pub async fn new() -> Self {
        Self::with_cluster(ClusterConfig::default()).await
    }

    pub async fn with_cluster(cluster: ClusterConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TomlConfig::default();
        config.registry = database(&dir, "registry", &[]);
        config.databases = vec![database(&dir, DATABASE, &["tissue", "cellline", "public"])];
        config.cluster = cluster;

        let service = CohortService::connect(&config).await.unwrap();
        let fixture = Self {
            service,
            config,
            _dir: dir,
        };
        fixture.seed().await;
        fixture
    }

    async fn seed(&self) {
        let pools = coral_common::db::DatabasePools::connect(&self.config.databases[0], &self.config.pool)
            .await
            .unwrap();
        let pool = pools.primary.pool();
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await.unwrap();
        }
        for &(name, gender, age, bmi, treatment) in TISSUES {
            sqlx::query("INSERT INTO tissue.tdp_tissue VALUES (?, ?, ?, ?, ?)")
                .bind(name)
                .bind(gender)
                .bind(age)
                .bind(bmi)
                .bind(treatment)
                .execute(pool)
                .await
                .unwrap();
        }
        pools.close().await;
    }

    /// Insert additional tissues through a short-lived connection
    pub async fn insert_tissues(&self, rows: &[(String, Option<i64>)]) {
        let pools = coral_common::db::DatabasePools::connect(&self.config.databases[0], &self.config.pool)
            .await
            .unwrap();
        for (name, age) in rows {
            sqlx::query("INSERT INTO tissue.tdp_tissue (tissuename, gender, age) VALUES (?, 'female', ?)")
                .bind(name)
                .bind(age)
                .execute(pools.primary.pool())
                .await
                .unwrap();
        }
        pools.close().await;
    }

    /// Insert `count` tissues `BULK00001..` sharing one age, generated inside SQLite
    pub async fn insert_bulk_tissues(&self, count: i64, age: i64) {
        let pools = coral_common::db::DatabasePools::connect(&self.config.databases[0], &self.config.pool)
            .await
            .unwrap();
        sqlx::query(
            "WITH RECURSIVE seq(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM seq WHERE i < ?)
             INSERT INTO tissue.tdp_tissue (tissuename, gender, age)
             SELECT printf('BULK%05d', i), 'female', ? FROM seq",
        )
        .bind(count)
        .bind(age)
        .execute(pools.primary.pool())
        .await
        .unwrap();
        pools.close().await;
    }

    pub async fn root(&self, schema: &str, table: &str) -> Cohort {
        self.service
            .create_root(&params(&[
                ("name", "root"),
                ("isInitial", "1"),
                ("previous", "-1"),
                ("database", DATABASE),
                ("schema", schema),
                ("table", table),
            ]))
            .await
            .unwrap()
    }

    pub async fn tissue_root(&self) -> Cohort {
        self.root("tissue", "tdp_tissue").await
    }

    /// Entity ids of a cohort, sorted
    pub async fn ids(&self, cohort_id: i64, id_column: &str) -> Vec<String> {
        let rows = self
            .service
            .data(&params(&[("cohortId", &cohort_id.to_string())]))
            .await
            .unwrap();
        let mut ids: Vec<String> = rows
            .iter()
            .map(|row| row[id_column].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids
    }
}
