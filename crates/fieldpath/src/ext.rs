use crate::{Element, Error, Path, Result};
use duplicate::duplicate_item;
use serde_json::{Map, Value};

fn matches_select(item: &Value, key: &str, value: &Value) -> bool {
    match item {
        Value::Object(obj) => obj.get(key).map(|found| found == value).unwrap_or(false),
        _ => false,
    }
}

fn find_selected(items: &[Value], key: &str, value: &Value) -> Result<Option<usize>> {
    let mut found = None;
    for (idx, item) in items.iter().enumerate() {
        if matches_select(item, key, value) {
            if found.is_some() {
                return Err(Error::SelectMatchedMultipleItems);
            }
            found.replace(idx);
        }
    }
    Ok(found)
}

fn entry_field<'a>(value: &'a mut Value, field: &str) -> Result<&'a mut Value> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(obj) => Ok(obj.entry(field).or_insert(Value::Null)),
        _ => Err(Error::NotAnObject),
    }
}

pub trait FieldpathExt: Sized {
    fn get_comp(&self, comp: &Element) -> Result<&Self>;
    fn get_path(&self, path: &Path) -> Result<&Self>;

    fn get_comp_mut(&mut self, comp: &Element) -> Result<&mut Self>;
    fn get_path_mut(&mut self, path: &Path) -> Result<&mut Self>;

    /// Like `get_comp_mut`, but creates the missing object field or array item
    fn entry_comp(&mut self, comp: &Element) -> Result<&mut Self>;
    /// Sets value at path, creating every missing intermediate step
    fn insert_path(&mut self, path: &Path, value: Self) -> Result<Option<Self>>;

    fn has_path(&self, path: &Path) -> bool;
}

impl FieldpathExt for Value {
    #[duplicate_item(
        this_method method reference(type) ret_type;
        [get_comp] [get] [&type] [&Self];
        [get_comp_mut] [get_mut] [&mut type] [&mut Self]
    )]
    fn this_method(self: reference([Self]), comp: &Element) -> Result<ret_type> {
        match comp {
            Element::Field(field) => self.method(field.as_str()).ok_or(Error::FieldNotFound),
            Element::StaticField(field) => self.method(*field).ok_or(Error::FieldNotFound),
            Element::Select(key, value) => match self {
                Value::Array(items) => {
                    let idx = find_selected(items, key, value)?.ok_or(Error::SelectMatchedNoItems)?;
                    items.method(idx).ok_or(Error::SelectMatchedNoItems)
                }
                _ => Err(Error::SelectTargetIsNotArray),
            },
        }
    }

    #[duplicate_item(
        this_method method reference(type) ret_type;
        [get_path] [get_comp] [&type] [&Self];
        [get_path_mut] [get_comp_mut] [&mut type] [&mut Self]
    )]
    fn this_method(self: reference([Self]), path: &Path) -> Result<ret_type> {
        let mut found = self;
        for (idx, elem) in path.iter().enumerate() {
            found = found
                .method(elem)
                .map_err(|e| Error::AtPath((&path[0..idx]).into(), Box::new(e)))?;
        }
        Ok(found)
    }

    fn entry_comp(&mut self, comp: &Element) -> Result<&mut Self> {
        match comp {
            Element::Field(field) => entry_field(self, field),
            Element::StaticField(field) => entry_field(self, field),
            Element::Select(key, value) => {
                if self.is_null() {
                    *self = Value::Array(Vec::new());
                }
                match self {
                    Value::Array(items) => {
                        let idx = match find_selected(items, key, value)? {
                            Some(idx) => idx,
                            None => {
                                let mut item = Map::new();
                                item.insert(key.clone(), value.clone());
                                items.push(Value::Object(item));
                                items.len() - 1
                            }
                        };
                        Ok(&mut items[idx])
                    }
                    _ => Err(Error::SelectTargetIsNotArray),
                }
            }
        }
    }

    fn insert_path(&mut self, path: &Path, value: Self) -> Result<Option<Self>> {
        if path.is_empty() {
            return Err(Error::EmptyPath);
        }
        let mut found = self;
        for (idx, elem) in path.iter().enumerate() {
            found = found
                .entry_comp(elem)
                .map_err(|e| Error::AtPath((&path[0..idx]).into(), Box::new(e)))?;
        }
        let old = std::mem::replace(found, value);
        Ok(if old.is_null() { None } else { Some(old) })
    }

    fn has_path(&self, path: &Path) -> bool {
        self.get_path(path).is_ok()
    }
}
