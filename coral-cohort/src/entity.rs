//! Entity tables known to the composer

use crate::sql::{Ident, TableRef};
use coral_common::db::Cohort;
use coral_common::{Error, Result};

/// Closed set of entity-table kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Tissue,
    CellLine,
    Gene,
    Survey,
}

impl EntityKind {
    /// Resolve the kind of an entity table
    pub fn resolve(entity_table: &str) -> Result<Self> {
        match entity_table {
            "tdp_tissue" | "tdp_tissue_2" => Ok(EntityKind::Tissue),
            "tdp_cellline" => Ok(EntityKind::CellLine),
            "tdp_gene" => Ok(EntityKind::Gene),
            "student_view_anonym" | "korea" => Ok(EntityKind::Survey),
            other => Err(Error::UnsupportedEntityTable(other.to_string())),
        }
    }

    /// Column identifying one entity
    pub fn id_column(self) -> Ident {
        match self {
            EntityKind::Tissue => Ident::fixed("tissuename"),
            EntityKind::CellLine => Ident::fixed("celllinename"),
            EntityKind::Gene => Ident::fixed("ensg"),
            EntityKind::Survey => Ident::fixed("id"),
        }
    }

    /// Whether per-gene score tables are keyed by this kind
    pub fn supports_scores(self) -> bool {
        matches!(self, EntityKind::Tissue | EntityKind::CellLine)
    }

    /// Panel-assignment table for this kind
    pub fn panel_table(self) -> Option<Ident> {
        match self {
            EntityKind::Tissue | EntityKind::CellLine => Some(Ident::fixed("tdp_panelassignment")),
            EntityKind::Gene => Some(Ident::fixed("tdp_geneassignment")),
            EntityKind::Survey => None,
        }
    }
}

/// The physical table a cohort lineage draws from
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySource {
    pub database: String,
    pub table: TableRef,
    pub kind: Option<EntityKind>,
}

impl EntitySource {
    /// Validate the names of a new root
    pub fn new(database: &str, schema: &str, table: &str) -> Result<Self> {
        Ok(Self {
            database: database.to_string(),
            table: TableRef::new(schema, table)?,
            kind: EntityKind::resolve(table).ok(),
        })
    }

    pub fn of(cohort: &Cohort) -> Result<Self> {
        Self::new(&cohort.entity_database, &cohort.entity_schema, &cohort.entity_table)
    }

    fn unsupported(&self, capability: &str) -> Error {
        Error::UnsupportedEntityTable(format!(
            "{} does not support {}",
            self.table.table.as_str(),
            capability
        ))
    }

    /// Kind of the table, required for identifier-keyed operations
    pub fn kind(&self) -> Result<EntityKind> {
        self.kind.ok_or_else(|| self.unsupported("entity identifiers"))
    }

    pub fn id_column(&self) -> Result<Ident> {
        Ok(self.kind()?.id_column())
    }

    /// Identifier column, for kinds joinable against score tables
    pub fn score_id_column(&self) -> Result<Ident> {
        let kind = self.kind()?;
        if kind.supports_scores() {
            Ok(kind.id_column())
        } else {
            Err(self.unsupported("score tables"))
        }
    }

    /// Identifier column and panel table
    pub fn panel(&self) -> Result<(Ident, TableRef)> {
        let kind = self.kind()?;
        let table = kind.panel_table().ok_or_else(|| self.unsupported("panel annotations"))?;
        Ok((
            kind.id_column(),
            TableRef {
                schema: self.table.schema.clone(),
                table,
            },
        ))
    }

    /// A per-gene score table (`tdp_<name>`) in the entity schema
    pub fn score_table(&self, name: &str) -> Result<TableRef> {
        Ok(TableRef {
            schema: self.table.schema.clone(),
            table: Ident::new(&format!("tdp_{}", name))?,
        })
    }
}
