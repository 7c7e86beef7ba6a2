//! Status collection kept in the managed database, reached through its console.

use super::{StatusBackend, STATUS_COLLECTION};
use crate::console::{marked_line, Console, ConsoleError};
use crate::error::MongrateError;
use serde_json::Value;

/// Database holding the status collection.
pub const STATUS_DATABASE: &str = "admin";

/// Prefix of the line a status query prints its result on.
const RESULT_MARKER: &str = "MONGRATE_STATUS ";

/// `admin.mongrate.status` on the target database.
pub struct ConsoleBackend {
    console: Console,
    database: String,
}

impl ConsoleBackend {
    pub fn new(console: Console, database: impl Into<String>) -> Self {
        Self {
            console,
            database: database.into(),
        }
    }

    /// Evaluate a JS expression and parse the JSON it prints.
    fn query(&self, expression: &str) -> Result<Value, MongrateError> {
        let stdout = self.console.eval(&self.database, &query_script(expression))?;
        let payload = marked_line(&stdout, RESULT_MARKER)
            .ok_or_else(|| ConsoleError::Malformed("no status result printed".to_string()))?;
        Ok(serde_json::from_str(payload)?)
    }

    fn execute(&self, script: &str) -> Result<(), MongrateError> {
        self.console.eval(&self.database, script)?;
        Ok(())
    }
}

impl StatusBackend for ConsoleBackend {
    fn location(&self) -> String {
        format!("{} ({}.{})", self.database, STATUS_DATABASE, STATUS_COLLECTION)
    }

    fn exists(&self) -> Result<bool, MongrateError> {
        let found = self.query(&format!(
            "db.getSiblingDB({}).getCollectionNames().indexOf({}) >= 0",
            js_string(STATUS_DATABASE),
            js_string(STATUS_COLLECTION)
        ))?;
        found
            .as_bool()
            .ok_or_else(|| MongrateError::MalformedStatus(format!("expected a boolean, got {}", found)))
    }

    fn find(&self, id: &str) -> Result<Option<Value>, MongrateError> {
        let found = self.query(&format!("{}.findOne({{_id: {}}})", collection(), js_string(id)))?;
        Ok((!found.is_null()).then_some(found))
    }

    fn find_all(&self) -> Result<Vec<Value>, MongrateError> {
        match self.query(&format!("{}.find().sort({{_id: 1}}).toArray()", collection()))? {
            Value::Array(documents) => Ok(documents),
            other => Err(MongrateError::MalformedStatus(format!(
                "expected an array, got {}",
                other
            ))),
        }
    }

    fn reset(&self, documents: &[Value]) -> Result<(), MongrateError> {
        self.execute(&reset_script(documents))
    }

    fn upsert(&self, documents: &[Value]) -> Result<(), MongrateError> {
        self.execute(&upsert_script(documents))
    }
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn collection() -> String {
    format!(
        "db.getSiblingDB({}).getCollection({})",
        js_string(STATUS_DATABASE),
        js_string(STATUS_COLLECTION)
    )
}

fn query_script(expression: &str) -> String {
    format!("print({} + JSON.stringify({}));", js_string(RESULT_MARKER), expression)
}

fn reset_script(documents: &[Value]) -> String {
    let mut script = format!("var c = {};c.drop();", collection());
    if !documents.is_empty() {
        script.push_str(&format!("c.insertMany({});", Value::from(documents.to_vec())));
    }
    script
}

fn upsert_script(documents: &[Value]) -> String {
    format!(
        "var c = {};{}.forEach(function (d) {{ c.replaceOne({{_id: d._id}}, d, {{upsert: true}}); }});",
        collection(),
        Value::from(documents.to_vec())
    )
}
