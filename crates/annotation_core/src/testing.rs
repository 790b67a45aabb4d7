//! Shared fixtures for unit and integration tests.
//!
//! The `isa` schema has three tables:
//!   person     (RID, name, email)            key person_pkey
//!   dataset    (RID, id, title, owner)       keys dataset_pkey, dataset_id_key
//!                                            fkey dataset_owner_fkey → person
//!   experiment (RID, dataset, label)         key experiment_pkey
//!                                            fkey experiment_dataset_fkey → dataset

use serde_json::{json, Value};

use crate::schema::{ConstraintName, ObjectId, SchemaModel};
use crate::tags;

pub fn catalog_document() -> Value {
    json!({
        "annotations": {
            (tags::DISPLAY): { "name": "ISA catalog" }
        },
        "schemas": {
            "isa": {
                "comment": "Investigation / study / assay",
                "annotations": {},
                "tables": {
                    "person": {
                        "kind": "table",
                        "annotations": {},
                        "column_definitions": [
                            column("RID", "ermrest_rid", false),
                            column("name", "text", true),
                            column("email", "text", true)
                        ],
                        "keys": [
                            { "names": [["isa", "person_pkey"]], "unique_columns": ["RID"] }
                        ],
                        "foreign_keys": []
                    },
                    "dataset": {
                        "kind": "table",
                        "comment": "A released collection of experiments",
                        "annotations": {
                            (tags::VISIBLE_COLUMNS): {
                                "*": ["id", "title"]
                            },
                            (tags::DISPLAY): { "name": "Dataset" }
                        },
                        "column_definitions": [
                            column("RID", "ermrest_rid", false),
                            column("id", "text", false),
                            column("title", "markdown", true),
                            {
                                "name": "owner",
                                "type": { "typename": "text" },
                                "nullok": true,
                                "annotations": {
                                    (tags::DISPLAY): { "name": "Owner" }
                                }
                            }
                        ],
                        "keys": [
                            { "names": [["isa", "dataset_pkey"]], "unique_columns": ["RID"] },
                            { "names": [["isa", "dataset_id_key"]], "unique_columns": ["id"] }
                        ],
                        "foreign_keys": [
                            {
                                "names": [["isa", "dataset_owner_fkey"]],
                                "foreign_key_columns": [
                                    { "schema_name": "isa", "table_name": "dataset", "column_name": "owner" }
                                ],
                                "referenced_columns": [
                                    { "schema_name": "isa", "table_name": "person", "column_name": "RID" }
                                ],
                                "annotations": {
                                    (tags::FOREIGN_KEY): { "to_name": "Owner", "from_name": "Datasets" }
                                }
                            }
                        ]
                    },
                    "experiment": {
                        "kind": "table",
                        "annotations": {},
                        "column_definitions": [
                            column("RID", "ermrest_rid", false),
                            column("dataset", "text", false),
                            column("label", "text", true)
                        ],
                        "keys": [
                            { "names": [["isa", "experiment_pkey"]], "unique_columns": ["RID"] }
                        ],
                        "foreign_keys": [
                            {
                                "names": [["isa", "experiment_dataset_fkey"]],
                                "foreign_key_columns": [
                                    { "schema_name": "isa", "table_name": "experiment", "column_name": "dataset" }
                                ],
                                "referenced_columns": [
                                    { "schema_name": "isa", "table_name": "dataset", "column_name": "RID" }
                                ]
                            }
                        ]
                    }
                }
            }
        }
    })
}

fn column(name: &str, typename: &str, nullok: bool) -> Value {
    json!({ "name": name, "type": { "typename": typename }, "nullok": nullok })
}

pub fn schema_model() -> SchemaModel {
    match SchemaModel::load(&catalog_document()) {
        Ok(model) => model,
        Err(e) => panic!("fixture catalog must parse: {e}"),
    }
}

pub fn dataset() -> ObjectId {
    ObjectId::table("isa", "dataset")
}

pub fn experiment() -> ObjectId {
    ObjectId::table("isa", "experiment")
}

pub fn person() -> ObjectId {
    ObjectId::table("isa", "person")
}

pub fn constraint(name: &str) -> ConstraintName {
    ConstraintName::new("isa", name)
}
