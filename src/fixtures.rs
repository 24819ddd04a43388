//! Shared test data: a small company with offices, titles and employees

use crate::config::Config;
use crate::core::{Registries, Site};
use crate::fields::MemoryCache;
use crate::meta::{Catalog, FieldDescriptor};
use crate::orm::{Database, FieldDef, InternalType, ModelDef, ModelKey, ModelKind, Row, Schema, Value};
use chrono::NaiveDate;
use std::sync::Arc;

pub const APP: &str = "tests";

pub fn office() -> ModelKey {
    ModelKey::new(APP, "office")
}

pub fn title() -> ModelKey {
    ModelKey::new(APP, "title")
}

pub fn month() -> ModelKey {
    ModelKey::new(APP, "month")
}

pub fn team() -> ModelKey {
    ModelKey::new(APP, "team")
}

pub fn employee() -> ModelKey {
    ModelKey::new(APP, "employee")
}

pub fn schema() -> Schema {
    use InternalType::*;

    Schema::new()
        .with_model(
            ModelDef::new(APP, "office")
                .field(FieldDef::auto("id"))
                .field(FieldDef::new("location", CharField)),
        )
        .with_model(
            ModelDef::new(APP, "title")
                .field(FieldDef::auto("id"))
                .field(FieldDef::new("name", CharField))
                .field(FieldDef::new("salary", IntegerField).nullable())
                .field(FieldDef::new("boss", BooleanField))
                .field(
                    FieldDef::new("grade", SmallIntegerField)
                        .nullable()
                        .choices(vec![(Value::Int(1), "Junior"), (Value::Int(2), "Senior")]),
                ),
        )
        .with_model(
            ModelDef::new(APP, "month")
                .kind(ModelKind::Lexicon)
                .field(FieldDef::auto("id"))
                .field(FieldDef::new("label", CharField))
                .field(FieldDef::new("value", CharField))
                .field(FieldDef::new("code", IntegerField).nullable())
                .field(FieldDef::new("order", IntegerField)),
        )
        .with_model(
            ModelDef::new(APP, "team")
                .kind(ModelKind::ObjectSet)
                .field(FieldDef::auto("id"))
                .field(FieldDef::new("name", CharField))
                .field(FieldDef::new("count", IntegerField)),
        )
        .with_model(
            ModelDef::new(APP, "employee")
                .field(FieldDef::auto("id"))
                .field(FieldDef::new("first_name", CharField))
                .field(FieldDef::new("last_name", CharField))
                .field(FieldDef::foreign_key("title", title()).nullable())
                .field(
                    FieldDef::foreign_key("office", office())
                        .limit_choices_to("location", "Chicago"),
                )
                .field(FieldDef::new("is_manager", BooleanField))
                .field(FieldDef::new("hired", DateField))
                .field(
                    FieldDef::foreign_key("start_month", month())
                        .nullable()
                        .limit_choices_to("code__lte", 2),
                ),
        )
}

fn row(values: Vec<(&str, Value)>) -> Row {
    values
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn date(y: i32, m: u32, d: u32) -> Value {
    NaiveDate::from_ymd_opt(y, m, d).map_or(Value::Null, Value::Date)
}

pub fn database() -> Database {
    let db = Database::new(schema());
    let save = |key: ModelKey, values: Vec<(&str, Value)>| {
        db.save(&key, row(values)).unwrap();
    };

    save(office(), vec![("location", "Chicago".into())]);
    save(office(), vec![("location", "Evanston".into())]);

    let titles = [
        ("Analyst", 20000, false, Some(1)),
        ("Programmer", 30000, false, Some(2)),
        ("QA", 15000, false, None),
        ("Intern", 10000, false, None),
        ("Project Manager", 50000, false, None),
        ("Director", 50000, true, None),
        ("CEO", 200000, true, None),
    ];
    for (name, salary, boss, grade) in titles {
        save(
            title(),
            vec![
                ("name", name.into()),
                ("salary", Value::Int(salary)),
                ("boss", boss.into()),
                ("grade", grade.map(Value::Int).unwrap_or_default()),
            ],
        );
    }

    for (i, (label, value)) in [("January", "jan"), ("February", "feb"), ("March", "mar")]
        .into_iter()
        .enumerate()
    {
        let n = i as i64 + 1;
        save(
            month(),
            vec![
                ("label", label.into()),
                ("value", value.into()),
                ("code", Value::Int(n)),
                ("order", Value::Int(n)),
            ],
        );
    }

    save(team(), vec![("name", "Engineering".into()), ("count", Value::Int(3))]);
    save(team(), vec![("name", "Leadership".into()), ("count", Value::Int(1))]);

    let employees = [
        ("Eric", "Smith", Some(2), 1, false, date(2010, 3, 1), Some(1)),
        ("Erin", "Jones", Some(1), 1, false, date(2011, 6, 15), None),
        ("Erick", "Smith", Some(2), 2, false, date(2012, 1, 9), Some(2)),
        ("Aaron", "Harris", Some(6), 1, true, date(2008, 11, 30), Some(1)),
        ("Zac", "Cook", Some(5), 2, false, date(2013, 8, 20), None),
        ("John", "Smith", None, 2, false, date(2014, 2, 3), Some(2)),
    ];
    for (first, last, title, office, manager, hired, start) in employees {
        save(
            employee(),
            vec![
                ("first_name", first.into()),
                ("last_name", last.into()),
                ("title", title.map(Value::Int).unwrap_or_default()),
                ("office", Value::Int(office)),
                ("is_manager", manager.into()),
                ("hired", hired),
                ("start_month", start.map(Value::Int).unwrap_or_default()),
            ],
        );
    }
    db
}

/// Published descriptors; ids follow insertion order starting at 1
pub fn catalog() -> Catalog {
    let catalog = Catalog::in_memory().unwrap();
    let descriptors = [
        FieldDescriptor::new(APP, "title", "name"),
        FieldDescriptor::new(APP, "title", "salary"),
        FieldDescriptor::new(APP, "title", "boss"),
        FieldDescriptor::new(APP, "employee", "is_manager").name("Boss"),
        FieldDescriptor::new(APP, "employee", "first_name"),
        FieldDescriptor::new(APP, "employee", "last_name"),
        FieldDescriptor::new(APP, "employee", "title"),
        FieldDescriptor::new(APP, "employee", "start_month"),
        FieldDescriptor::new(APP, "title", "grade"),
        FieldDescriptor::new(APP, "office", "location"),
        FieldDescriptor::new(APP, "team", "id"),
        FieldDescriptor::new(APP, "employee", "hired"),
        FieldDescriptor::new(APP, "month", "label"),
        FieldDescriptor::new(APP, "employee", "ghost"),
    ];
    for descriptor in descriptors {
        catalog.create_field(&descriptor.published()).unwrap();
    }
    catalog
}

pub fn site() -> Site {
    Site::new(
        Config::default(),
        Registries::with_builtins(),
        Arc::new(database()),
        Arc::new(catalog()),
        Some(Arc::new(MemoryCache::new())),
    )
}
