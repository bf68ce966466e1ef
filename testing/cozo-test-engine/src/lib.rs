///
/// cozo-test-engine - In-process stand-in for libcozo_c
///
/// Exposes the nine C entry points with the real signatures, allocates
/// every response with `libc::malloc`, and records each allocation until it
/// comes back through `free_str`. All state is thread-local, so each test
/// (one thread per test under libtest) sees its own databases and counters.
///
/// Script support is tiny:
/// - `:create name {a, b}`
/// - `?[a, b] <- [[1, 2]]` and `?[a, b] <- $param`, optionally followed by
///   `:create name {a, b}`
/// - `?[a, b] := *name[a, b]`
/// - `::garbage` answers with text that is not JSON
/// - `::null` answers with a null pointer
///
/// `inject_fault` makes the next call to a given entry point reply with
/// garbage, a null pointer or a bare `{"ok":true}`.
///

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::{CStr, c_char};
use std::path::Path;

use serde_json::{Value, json};

use cozo_ffi::EntryPoints;

#[derive(Debug, Clone, Default)]
struct Relation {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

type Store = BTreeMap<String, Relation>;
type Outcome = Result<Value, Value>;

thread_local! {
    static DATABASES: RefCell<HashMap<i32, Store>> = RefCell::new(HashMap::new());
    static NEXT_ID: Cell<i32> = const { Cell::new(1) };
    static OUTSTANDING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
    static ALLOCATED: Cell<usize> = const { Cell::new(0) };
    static FREED: Cell<usize> = const { Cell::new(0) };
    static BAD_FREES: Cell<usize> = const { Cell::new(0) };
    static CLOSED: RefCell<Vec<i32>> = const { RefCell::new(Vec::new()) };
    static LAST_IMMUTABLE: Cell<Option<bool>> = const { Cell::new(None) };
    static LAST_OPTIONS: RefCell<Option<String>> = const { RefCell::new(None) };
    static FAULTS: RefCell<HashMap<&'static str, Fault>> = RefCell::new(HashMap::new());
}

/// Entry points that answer with a response buffer, by the name the
/// binding reports in its errors.
pub const RESPONDING_ENTRY_POINTS: [&str; 6] = [
    "run_query",
    "import_relations",
    "export_relations",
    "backup",
    "restore",
    "import_from_backup",
];

/// One-shot misbehaviour for a single entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reply with text that is not JSON.
    Garbage,
    /// Reply with a null pointer.
    Null,
    /// Reply `{"ok":true}` and nothing else.
    BareOk,
}

/// Make the next call to `entry` reply according to `fault`.
pub fn inject_fault(entry: &'static str, fault: Fault) {
    assert!(
        RESPONDING_ENTRY_POINTS.contains(&entry),
        "no responding entry point named {entry}"
    );
    FAULTS.with(|f| f.borrow_mut().insert(entry, fault));
}

fn injected(entry: &'static str) -> Option<*mut c_char> {
    let fault = FAULTS.with(|f| f.borrow_mut().remove(entry))?;
    Some(match fault {
        Fault::Garbage => engine_string("<<not json>>"),
        Fault::Null => std::ptr::null_mut(),
        Fault::BareOk => engine_string(r#"{"ok":true}"#),
    })
}

pub fn entry_points() -> EntryPoints {
    EntryPoints {
        open_db,
        close_db,
        run_query,
        import_relations,
        export_relations,
        backup,
        restore,
        import_from_backup,
        free_str,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub allocated: usize,
    pub freed: usize,
    pub outstanding: usize,
    pub bad_frees: usize,
}

pub fn buffer_stats() -> BufferStats {
    BufferStats {
        allocated: ALLOCATED.with(|n| n.get()),
        freed: FREED.with(|n| n.get()),
        outstanding: OUTSTANDING.with(|o| o.borrow().len()),
        bad_frees: BAD_FREES.with(|n| n.get()),
    }
}

/// Every buffer handed out on this thread came back exactly once.
pub fn assert_no_leaks() {
    let stats = buffer_stats();
    assert_eq!(stats.outstanding, 0, "engine buffers leaked: {stats:?}");
    assert_eq!(stats.bad_frees, 0, "unknown or double free: {stats:?}");
    assert_eq!(stats.allocated, stats.freed, "alloc/free mismatch: {stats:?}");
}

pub fn closed_ids() -> Vec<i32> {
    CLOSED.with(|c| c.borrow().clone())
}

pub fn open_ids() -> Vec<i32> {
    DATABASES.with(|d| {
        let mut ids: Vec<i32> = d.borrow().keys().copied().collect();
        ids.sort();
        ids
    })
}

pub fn last_immutable() -> Option<bool> {
    LAST_IMMUTABLE.with(|c| c.get())
}

pub fn last_options() -> Option<String> {
    LAST_OPTIONS.with(|c| c.borrow().clone())
}

fn engine_string(text: &str) -> *mut c_char {
    let bytes = text.as_bytes();
    unsafe {
        let ptr = libc::malloc(bytes.len() + 1) as *mut u8;
        if ptr.is_null() {
            std::process::abort();
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        *ptr.add(bytes.len()) = 0;
        OUTSTANDING.with(|o| o.borrow_mut().insert(ptr as usize));
        ALLOCATED.with(|n| n.set(n.get() + 1));
        ptr.cast()
    }
}

unsafe extern "C" fn free_str(s: *mut c_char) {
    let known = OUTSTANDING.with(|o| o.borrow_mut().remove(&(s as usize)));
    if !known {
        BAD_FREES.with(|n| n.set(n.get() + 1));
        return;
    }
    FREED.with(|n| n.set(n.get() + 1));
    unsafe { libc::free(s.cast()) }
}

fn read(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn respond(outcome: Outcome) -> *mut c_char {
    let value = outcome.unwrap_or_else(|failure| failure);
    engine_string(&value.to_string())
}

fn failure(code: &str, message: &str) -> Value {
    json!({
        "ok": false,
        "code": code,
        "message": message,
        "display": format!("{code}\n\n  x {message}"),
    })
}

fn parse_error() -> Value {
    failure(
        "parser::pest",
        "The query parser has encountered unexpected input / end of input",
    )
}

fn ok() -> Value {
    json!({"ok": true})
}

fn rows_envelope(headers: &[String], rows: &[Vec<Value>]) -> Value {
    json!({"ok": true, "headers": headers, "rows": rows, "took": 0.0001})
}

fn with_db(db_id: i32, f: impl FnOnce(&mut Store) -> Outcome) -> Outcome {
    DATABASES.with(|d| match d.borrow_mut().get_mut(&db_id) {
        Some(store) => f(store),
        None => Err(failure("db::not_found", &format!("database {db_id} not found"))),
    })
}

unsafe extern "C" fn open_db(
    engine: *const c_char,
    _path: *const c_char,
    options: *const c_char,
    db_id: *mut i32,
) -> *mut c_char {
    let engine = read(engine);
    let options = read(options);
    LAST_OPTIONS.with(|c| *c.borrow_mut() = Some(options.clone()));

    if engine != "mem" {
        return engine_string(&format!("engine '{engine}' is not compiled into this build"));
    }
    match serde_json::from_str::<Value>(&options) {
        Ok(Value::Object(_)) => {}
        _ => return engine_string("options must be a JSON object"),
    }

    let id = NEXT_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    });
    DATABASES.with(|d| d.borrow_mut().insert(id, Store::new()));
    unsafe { *db_id = id };
    std::ptr::null_mut()
}

unsafe extern "C" fn close_db(db_id: i32) -> bool {
    CLOSED.with(|c| c.borrow_mut().push(db_id));
    DATABASES.with(|d| d.borrow_mut().remove(&db_id).is_some())
}

unsafe extern "C" fn run_query(
    db_id: i32,
    script: *const c_char,
    params: *const c_char,
    immutable: bool,
) -> *mut c_char {
    if let Some(reply) = injected("run_query") {
        return reply;
    }
    LAST_IMMUTABLE.with(|c| c.set(Some(immutable)));
    let script = read(script);
    match script.trim() {
        "::garbage" => return engine_string("<<not json>>"),
        "::null" => return std::ptr::null_mut(),
        _ => {}
    }
    let params: Value = match serde_json::from_str(&read(params)) {
        Ok(v) => v,
        Err(_) => return respond(Err(failure("params::invalid", "params must be JSON"))),
    };
    respond(with_db(db_id, |store| eval(store, &script, &params, immutable)))
}

fn eval(store: &mut Store, script: &str, params: &Value, immutable: bool) -> Outcome {
    let script = script.trim();
    if let Some(decl) = script.strip_prefix(":create") {
        let (name, headers) = parse_relation_decl(decl)?;
        return create(store, immutable, name, headers, Vec::new());
    }

    let rest = script.strip_prefix("?[").ok_or_else(parse_error)?;
    let (head, body) = rest.split_once(']').ok_or_else(parse_error)?;
    let headers = split_names(head);
    let body = body.trim();

    if let Some(source) = body.strip_prefix(":=") {
        let inner = source.trim().strip_prefix('*').ok_or_else(parse_error)?;
        let (name, _) = inner.split_once('[').ok_or_else(parse_error)?;
        let name = name.trim();
        let rel = store.get(name).ok_or_else(|| {
            failure(
                "query::relation_not_found",
                &format!("Cannot find requested stored relation '{name}'"),
            )
        })?;
        if rel.headers.len() != headers.len() {
            return Err(arity_error(name, rel.headers.len(), headers.len()));
        }
        return Ok(rows_envelope(&headers, &rel.rows));
    }

    if let Some(source) = body.strip_prefix("<-") {
        let (data, create_decl) = match source.split_once(":create") {
            Some((data, decl)) => (data, Some(decl)),
            None => (source, None),
        };
        let rows = parse_rows(data.trim(), params)?;
        if let Some(bad) = rows.iter().find(|r| r.len() != headers.len()) {
            return Err(arity_error("?", headers.len(), bad.len()));
        }
        return match create_decl {
            Some(decl) => {
                let (name, columns) = parse_relation_decl(decl)?;
                if columns.len() != headers.len() {
                    return Err(arity_error(name, columns.len(), headers.len()));
                }
                create(store, immutable, name, columns, rows)
            }
            None => Ok(rows_envelope(&headers, &rows)),
        };
    }

    Err(parse_error())
}

fn arity_error(name: &str, expected: usize, got: usize) -> Value {
    failure(
        "eval::arity_mismatch",
        &format!("Arity mismatch for rule application '{name}': expected {expected}, got {got}"),
    )
}

fn create(
    store: &mut Store,
    immutable: bool,
    name: &str,
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
) -> Outcome {
    if immutable {
        return Err(failure(
            "eval::mutation_in_immutable",
            "Cannot create relations in an immutable query",
        ));
    }
    if store.contains_key(name) {
        return Err(failure(
            "eval::relation_conflict",
            &format!("Stored relation {name} conflicts with an existing one"),
        ));
    }
    store.insert(name.to_string(), Relation { headers, rows });
    Ok(json!({"ok": true, "headers": ["status"], "rows": [["OK"]], "took": 0.0}))
}

fn parse_relation_decl(decl: &str) -> Result<(&str, Vec<String>), Value> {
    let (name, cols) = decl.split_once('{').ok_or_else(parse_error)?;
    let cols = cols.trim().strip_suffix('}').ok_or_else(parse_error)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(parse_error());
    }
    Ok((name, split_names(cols)))
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_rows(data: &str, params: &Value) -> Result<Vec<Vec<Value>>, Value> {
    if let Some(param) = data.strip_prefix('$') {
        let value = params.get(param).ok_or_else(|| {
            failure("eval::param_not_found", &format!("Parameter ${param} not given"))
        })?;
        return serde_json::from_value(value.clone())
            .map_err(|_| failure("eval::bad_param", &format!("Parameter ${param} is not a list of rows")));
    }
    serde_json::from_str(data).map_err(|_| parse_error())
}

fn store_to_value(store: &Store, names: Option<&[String]>) -> Outcome {
    let mut data = serde_json::Map::new();
    let selected: Vec<&String> = match names {
        Some(names) => names.iter().collect(),
        None => store.keys().collect(),
    };
    for name in selected {
        let rel = store.get(name).ok_or_else(|| {
            failure(
                "query::relation_not_found",
                &format!("Cannot find requested stored relation '{name}'"),
            )
        })?;
        data.insert(name.clone(), json!({"headers": rel.headers, "rows": rel.rows}));
    }
    Ok(Value::Object(data))
}

fn value_to_store(value: &Value) -> Result<Store, Value> {
    let invalid = || failure("import::invalid", "relation payload must map names to {headers, rows}");
    let obj = value.as_object().ok_or_else(invalid)?;
    let mut store = Store::new();
    for (name, rel) in obj {
        let headers: Vec<String> = serde_json::from_value(rel.get("headers").cloned().ok_or_else(invalid)?)
            .map_err(|_| invalid())?;
        let rows: Vec<Vec<Value>> = serde_json::from_value(rel.get("rows").cloned().ok_or_else(invalid)?)
            .map_err(|_| invalid())?;
        store.insert(name.clone(), Relation { headers, rows });
    }
    Ok(store)
}

fn merge_into(target: &mut Store, incoming: Store) -> Outcome {
    for (name, rel) in incoming {
        let existing = target.get_mut(&name).ok_or_else(|| {
            failure(
                "import::relation_not_found",
                &format!("Cannot import into missing stored relation '{name}'"),
            )
        })?;
        if existing.headers != rel.headers {
            return Err(failure(
                "import::header_mismatch",
                &format!("Headers of '{name}' do not match the stored relation"),
            ));
        }
        for row in rel.rows {
            if !existing.rows.contains(&row) {
                existing.rows.push(row);
            }
        }
    }
    Ok(ok())
}

fn read_backup(path: &str) -> Result<Store, Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| failure("backup::read", &format!("Cannot read backup {path}: {e}")))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|_| failure("backup::corrupt", &format!("Backup {path} is corrupt")))?;
    value_to_store(&value)
}

unsafe extern "C" fn import_relations(db_id: i32, payload: *const c_char) -> *mut c_char {
    if let Some(reply) = injected("import_relations") {
        return reply;
    }
    let payload = read(payload);
    respond(with_db(db_id, |store| {
        let value: Value = serde_json::from_str(&payload).map_err(|_| parse_error())?;
        let incoming = value_to_store(&value)?;
        merge_into(store, incoming)
    }))
}

unsafe extern "C" fn export_relations(db_id: i32, payload: *const c_char) -> *mut c_char {
    if let Some(reply) = injected("export_relations") {
        return reply;
    }
    let payload = read(payload);
    respond(with_db(db_id, |store| {
        let value: Value = serde_json::from_str(&payload).map_err(|_| parse_error())?;
        let names: Vec<String> = value
            .get("relations")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| failure("export::invalid", "payload must contain 'relations'"))?;
        let data = store_to_value(store, Some(&names))?;
        Ok(json!({"ok": true, "data": data}))
    }))
}

unsafe extern "C" fn backup(db_id: i32, out_path: *const c_char) -> *mut c_char {
    if let Some(reply) = injected("backup") {
        return reply;
    }
    let path = read(out_path);
    respond(with_db(db_id, |store| {
        if Path::new(&path).exists() {
            return Err(failure("backup::exists", &format!("Backup file {path} already exists")));
        }
        let data = store_to_value(store, None)?;
        std::fs::write(&path, data.to_string())
            .map_err(|e| failure("backup::write", &format!("Cannot write {path}: {e}")))?;
        Ok(ok())
    }))
}

unsafe extern "C" fn restore(db_id: i32, in_path: *const c_char) -> *mut c_char {
    if let Some(reply) = injected("restore") {
        return reply;
    }
    let path = read(in_path);
    respond(with_db(db_id, |store| {
        if !store.is_empty() {
            return Err(failure("restore::not_empty", "Cannot restore into a non-empty database"));
        }
        *store = read_backup(&path)?;
        Ok(ok())
    }))
}

unsafe extern "C" fn import_from_backup(db_id: i32, payload: *const c_char) -> *mut c_char {
    if let Some(reply) = injected("import_from_backup") {
        return reply;
    }
    let payload = read(payload);
    respond(with_db(db_id, |store| {
        let value: Value = serde_json::from_str(&payload).map_err(|_| parse_error())?;
        let path = value
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| failure("backup::invalid", "payload must contain 'path'"))?;
        let names: Vec<String> = value
            .get("relations")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| failure("backup::invalid", "payload must contain 'relations'"))?;
        let source = read_backup(path)?;
        let selected = store_to_value(&source, Some(&names))?;
        merge_into(store, value_to_store(&selected)?)
    }))
}
