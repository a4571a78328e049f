use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Deferred query over a live snapshot of an entity set.
///
/// Predicates and ordering are recorded, not applied; nothing is evaluated
/// until [`Query::execute`].
pub struct Query<T> {
    source: Vec<T>,
    predicates: Vec<Predicate<T>>,
    ordering: Option<Comparator<T>>,
    skip: usize,
    top: Option<usize>,
}

impl<T> Query<T> {
    pub fn from_source(source: Vec<T>) -> Self {
        Self {
            source,
            predicates: Vec::new(),
            ordering: None,
            skip: 0,
            top: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Replaces any earlier ordering.
    pub fn order_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.ordering = Some(Box::new(compare));
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    pub fn top(mut self, count: usize) -> Self {
        self.top = Some(count);
        self
    }

    /// Number of rows the predicates admit, ignoring paging.
    pub fn count(&self) -> usize {
        self.source.iter().filter(|row| self.admits(row)).count()
    }

    pub fn execute(self) -> Vec<T> {
        let Query {
            source,
            predicates,
            ordering,
            skip,
            top,
        } = self;

        let mut rows: Vec<T> = source
            .into_iter()
            .filter(|row| predicates.iter().all(|predicate| predicate(row)))
            .collect();
        if let Some(compare) = ordering {
            rows.sort_by(|left, right| compare(left, right));
        }

        rows.into_iter()
            .skip(skip)
            .take(top.unwrap_or(usize::MAX))
            .collect()
    }

    fn admits(&self, row: &T) -> bool {
        self.predicates.iter().all(|predicate| predicate(row))
    }
}

impl<T: fmt::Debug> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("source_rows", &self.source.len())
            .field("predicates", &self.predicates.len())
            .field("ordered", &self.ordering.is_some())
            .field("skip", &self.skip)
            .field("top", &self.top)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub property: String,
    pub descending: bool,
}

/// System query options understood by the collection endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub top: Option<usize>,
    pub skip: Option<usize>,
    pub order_by: Option<OrderBy>,
    pub expand: Vec<String>,
    pub count: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryOptionError {
    #[error("`{option}` expects a non-negative integer, got `{value}`")]
    NotANumber { option: &'static str, value: String },
    #[error("`$orderby` expects `<Property> [asc|desc]`, got `{0}`")]
    InvalidOrderBy(String),
    #[error("`$count` expects `true` or `false`, got `{0}`")]
    InvalidCount(String),
    #[error("unsupported query option `{0}`")]
    Unsupported(String),
}

impl QueryOptions {
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, QueryOptionError> {
        let mut options = QueryOptions::default();

        for (name, value) in params {
            let value = value.trim();
            match name.as_str() {
                "$top" => options.top = Some(parse_count("$top", value)?),
                "$skip" => options.skip = Some(parse_count("$skip", value)?),
                "$orderby" => options.order_by = Some(parse_order_by(value)?),
                "$expand" => {
                    options.expand = value
                        .split(',')
                        .map(str::trim)
                        .filter(|part| !part.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "$count" => {
                    options.count = match value {
                        "true" => true,
                        "false" => false,
                        other => return Err(QueryOptionError::InvalidCount(other.to_string())),
                    }
                }
                other if other.starts_with('$') => {
                    return Err(QueryOptionError::Unsupported(other.to_string()))
                }
                _ => {}
            }
        }

        Ok(options)
    }

    /// Applies `$orderby`, `$skip` and `$top` (capped at `max_page_size`) to
    /// serialized rows through the same deferred pipeline the views use.
    pub fn page(&self, rows: Vec<Value>, max_page_size: usize) -> Vec<Value> {
        let mut query = Query::from_source(rows);
        if let Some(OrderBy {
            property,
            descending,
        }) = self.order_by.clone()
        {
            query = query.order_by(move |left: &Value, right: &Value| {
                let ordering = compare_json(&left[&property], &right[&property]);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        query
            .skip(self.skip.unwrap_or(0))
            .top(self.top.unwrap_or(max_page_size).min(max_page_size))
            .execute()
    }
}

fn parse_count(option: &'static str, value: &str) -> Result<usize, QueryOptionError> {
    value
        .parse::<usize>()
        .map_err(|_| QueryOptionError::NotANumber {
            option,
            value: value.to_string(),
        })
}

fn parse_order_by(value: &str) -> Result<OrderBy, QueryOptionError> {
    let mut parts = value.split_whitespace();
    let property = parts
        .next()
        .ok_or_else(|| QueryOptionError::InvalidOrderBy(value.to_string()))?;
    let descending = match parts.next() {
        None => false,
        Some(direction) if direction.eq_ignore_ascii_case("asc") => false,
        Some(direction) if direction.eq_ignore_ascii_case("desc") => true,
        Some(_) => return Err(QueryOptionError::InvalidOrderBy(value.to_string())),
    };
    if parts.next().is_some() {
        return Err(QueryOptionError::InvalidOrderBy(value.to_string()));
    }

    Ok(OrderBy {
        property: property.to_string(),
        descending,
    })
}

/// Nulls sort first; mixed kinds fall back to a fixed kind order.
fn compare_json(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => kind_rank(left).cmp(&kind_rank(right)),
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
