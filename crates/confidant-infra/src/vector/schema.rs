//! Arrow schema of the LanceDB memory table.
//!
//! The vector width is fixed per table. It is taken from the first embedding
//! stored, so any embedding model works without configuration.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Table holding memories of every scope.
pub const MEMORY_TABLE: &str = "memories";

/// Element field of the `vector` column.
pub fn vector_item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, true))
}

/// Schema for the memory table with `dimension`-wide embeddings.
pub fn memory_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("session_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("server_id", DataType::Utf8, true),
        Field::new("scope", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("memory_type", DataType::Utf8, false),
        Field::new("importance", DataType::Float32, false),
        Field::new("estimated_tokens", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(vector_item_field(), dimension),
            false,
        ),
    ])
}
