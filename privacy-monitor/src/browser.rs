/*!
Browser cookie database access.
Reads Chromium and Firefox cookie stores and removes cookies from them.
*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use privacy_engine::{Cookie, CookieKey, SameSite};
use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, info};

use crate::core::error::{MonitorError, Result};

const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieDbFlavor {
    /// Chrome, Edge, Brave: `cookies` table, WebKit timestamps
    Chromium,
    /// `moz_cookies` table, Unix timestamps
    Firefox,
}

impl CookieDbFlavor {
    fn table(&self) -> &'static str {
        match self {
            CookieDbFlavor::Chromium => "cookies",
            CookieDbFlavor::Firefox => "moz_cookies",
        }
    }

    fn host_column(&self) -> &'static str {
        match self {
            CookieDbFlavor::Chromium => "host_key",
            CookieDbFlavor::Firefox => "host",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserCookieStore {
    path: PathBuf,
    flavor: CookieDbFlavor,
}

impl BrowserCookieStore {
    /// Open a cookie database and detect which browser wrote it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::open_read_only(&path)?;

        let flavor = if has_table(&conn, "cookies")? {
            CookieDbFlavor::Chromium
        } else if has_table(&conn, "moz_cookies")? {
            CookieDbFlavor::Firefox
        } else {
            return Err(MonitorError::UnsupportedCookieStore(path.display().to_string()));
        };

        info!("Opened {:?} cookie store at {:?}", flavor, path);
        Ok(Self { path, flavor })
    }

    pub fn flavor(&self) -> CookieDbFlavor {
        self.flavor
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_read_only(path: &Path) -> Result<Connection> {
        Ok(Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }

    /// Enumerate cookies, optionally restricted to `host` and `.host`
    pub fn list_cookies(&self, host: Option<&str>) -> Result<Vec<Cookie>> {
        let conn = Self::open_read_only(&self.path)?;
        let cookies = match self.flavor {
            CookieDbFlavor::Chromium => self.list_chromium(&conn, host)?,
            CookieDbFlavor::Firefox => self.list_firefox(&conn, host)?,
        };
        debug!("Enumerated {} cookies (filter: {:?})", cookies.len(), host);
        Ok(cookies)
    }

    fn list_chromium(&self, conn: &Connection, host: Option<&str>) -> Result<Vec<Cookie>> {
        let columns = table_columns(conn, "cookies")?;
        let same_site_col = select_col(&columns, &["samesite", "same_site"], "NULL");
        let http_only_col = select_col(&columns, &["is_httponly", "is_http_only", "httponly"], "NULL");
        let secure_col = select_col(&columns, &["is_secure", "secure"], "NULL");

        let query = format!(
            "SELECT host_key, name, value, path, expires_utc, {secure}, {http_only}, {same_site} FROM cookies{filter}",
            secure = secure_col,
            http_only = http_only_col,
            same_site = same_site_col,
            filter = host_clause(self.flavor, host),
        );
        query_cookies(conn, &query, host, |row| {
            let expires: Option<i64> = row.get(4)?;
            let same_site: Option<i64> = row.get(7)?;
            Ok(Cookie {
                domain: row.get(0)?,
                name: row.get(1)?,
                value: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                path: row.get(3)?,
                secure: row.get::<_, Option<i64>>(5)?.map(|v| v != 0),
                http_only: row.get::<_, Option<i64>>(6)?.map(|v| v != 0),
                same_site: same_site.and_then(same_site_from_code),
                expires: expires.and_then(webkit_timestamp_to_datetime),
                store_id: None,
            })
        })
    }

    fn list_firefox(&self, conn: &Connection, host: Option<&str>) -> Result<Vec<Cookie>> {
        let columns = table_columns(conn, "moz_cookies")?;
        let same_site_col = select_col(&columns, &["samesite"], "NULL");

        let query = format!(
            "SELECT host, name, value, path, expiry, isSecure, isHttpOnly, {same_site} FROM moz_cookies{filter}",
            same_site = same_site_col,
            filter = host_clause(self.flavor, host),
        );
        query_cookies(conn, &query, host, |row| {
            let expiry: Option<i64> = row.get(4)?;
            let same_site: Option<i64> = row.get(7)?;
            Ok(Cookie {
                domain: row.get(0)?,
                name: row.get(1)?,
                value: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                path: row.get(3)?,
                secure: row.get::<_, Option<i64>>(5)?.map(|v| v != 0),
                http_only: row.get::<_, Option<i64>>(6)?.map(|v| v != 0),
                same_site: same_site.and_then(same_site_from_code),
                expires: expiry
                    .filter(|secs| *secs > 0)
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
                store_id: None,
            })
        })
    }

    /// Delete a cookie from the browser store. Returns false when no row matched.
    pub fn remove_cookie(&self, key: &CookieKey) -> Result<bool> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND name = ?2 AND path = ?3",
            self.flavor.table(),
            self.flavor.host_column(),
        );
        let removed = conn.execute(&sql, (&key.domain, &key.name, &key.path))?;
        debug!("Removed {} rows for cookie {}", removed, key);
        Ok(removed > 0)
    }

    /// Latest modification time of the database and its journal files
    pub fn last_modified(&self) -> Option<FileTime> {
        let mut candidates = vec![self.path.clone()];
        for suffix in ["-wal", "-journal"] {
            let mut sidecar = self.path.clone().into_os_string();
            sidecar.push(suffix);
            candidates.push(PathBuf::from(sidecar));
        }

        candidates
            .iter()
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|meta| FileTime::from_last_modification_time(&meta))
            .max()
    }
}

/// Whether a cookie domain falls inside a host-filtered listing: the host itself
/// or its dot-prefixed form
pub fn in_host_scope(domain: &str, host: &str) -> bool {
    domain == host || domain.strip_prefix('.') == Some(host.trim_start_matches('.'))
}

fn host_clause(flavor: CookieDbFlavor, host: Option<&str>) -> String {
    match host {
        Some(_) => format!(" WHERE {col} = ?1 OR {col} = ?2", col = flavor.host_column()),
        None => String::new(),
    }
}

fn query_cookies<F>(conn: &Connection, query: &str, host: Option<&str>, map: F) -> Result<Vec<Cookie>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<Cookie>,
{
    let mut stmt = conn.prepare(query)?;
    let rows = match host {
        Some(host) => {
            let dotted = format!(".{}", host.trim_start_matches('.'));
            stmt.query_map((host, dotted), map)?.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<_>>>()?,
    };
    Ok(rows)
}

/// Both browsers use 0 none, 1 lax, 2 strict; Chromium adds -1 for unspecified
fn same_site_from_code(value: i64) -> Option<SameSite> {
    match value {
        0 => Some(SameSite::None),
        1 => Some(SameSite::Lax),
        2 => Some(SameSite::Strict),
        _ => None,
    }
}

/// Microseconds since 1601-01-01; zero means a session cookie
pub fn webkit_timestamp_to_datetime(microseconds: i64) -> Option<DateTime<Utc>> {
    if microseconds <= 0 {
        return None;
    }
    let secs = microseconds / 1_000_000 - WEBKIT_EPOCH_OFFSET_SECS;
    if secs < 0 {
        return None;
    }
    let nsecs = ((microseconds % 1_000_000).abs() as u32) * 1000;
    DateTime::<Utc>::from_timestamp(secs, nsecs)
}

fn has_table(conn: &Connection, name: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
    let mut rows = stmt.query([name])?;
    Ok(rows.next()?.is_some())
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row?.to_ascii_lowercase());
    }
    Ok(out)
}

fn select_col<'a>(columns: &HashSet<String>, candidates: &'a [&'a str], fallback: &'a str) -> &'a str {
    candidates
        .iter()
        .find(|candidate| columns.contains(&candidate.to_ascii_lowercase()))
        .copied()
        .unwrap_or(fallback)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) fn create_chromium_db(path: &Path) -> Connection {
        let conn = Connection::open(path).expect("conn");
        conn.execute(
            "CREATE TABLE cookies (creation_utc INTEGER, host_key TEXT, name TEXT, value TEXT, path TEXT, \
             expires_utc INTEGER, is_secure INTEGER, is_httponly INTEGER, samesite INTEGER)",
            [],
        )
        .expect("create cookies");
        conn
    }

    pub(crate) fn insert_chromium_cookie(
        conn: &Connection,
        host: &str,
        name: &str,
        value: &str,
        secure: bool,
        http_only: bool,
    ) {
        conn.execute(
            "INSERT INTO cookies (creation_utc, host_key, name, value, path, expires_utc, is_secure, is_httponly, samesite) \
             VALUES (13303449600000000, ?1, ?2, ?3, '/', 0, ?4, ?5, -1)",
            (host, name, value, secure as i64, http_only as i64),
        )
        .expect("insert cookie");
    }

    #[test]
    fn reads_chromium_cookies() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("Cookies");
        let conn = create_chromium_db(&path);
        conn.execute(
            "INSERT INTO cookies (creation_utc, host_key, name, value, path, expires_utc, is_secure, is_httponly, samesite) \
             VALUES (0, '.doubleclick.net', 'IDE', 'abc', '/', 13303449600000000, 1, 1, 0)",
            [],
        )
        .expect("insert cookie");
        insert_chromium_cookie(&conn, "example.com", "sid", "xyz", false, false);
        drop(conn);

        let store = BrowserCookieStore::open(&path).expect("open");
        assert_eq!(store.flavor(), CookieDbFlavor::Chromium);

        let cookies = store.list_cookies(None).expect("list");
        assert_eq!(cookies.len(), 2);
        let ide = cookies.iter().find(|c| c.name == "IDE").unwrap();
        assert_eq!(ide.same_site, Some(SameSite::None));
        assert_eq!(ide.secure, Some(true));
        assert!(ide.expires.is_some());

        let sid = cookies.iter().find(|c| c.name == "sid").unwrap();
        assert!(sid.expires.is_none());
        assert!(sid.same_site.is_none());
    }

    #[test]
    fn filters_by_host_and_dotted_host() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("Cookies");
        let conn = create_chromium_db(&path);
        insert_chromium_cookie(&conn, "example.com", "a", "1", true, true);
        insert_chromium_cookie(&conn, ".example.com", "b", "2", true, true);
        insert_chromium_cookie(&conn, "other.org", "c", "3", true, true);
        drop(conn);

        let store = BrowserCookieStore::open(&path).expect("open");
        let cookies = store.list_cookies(Some("example.com")).expect("list");
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| in_host_scope(&c.domain, "example.com")));
        assert!(!in_host_scope("other.org", "example.com"));
        assert!(!in_host_scope("sub.example.com", "example.com"));
    }

    #[test]
    fn reads_firefox_cookies() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cookies.sqlite");
        let conn = Connection::open(&path).expect("conn");
        conn.execute(
            "CREATE TABLE moz_cookies (id INTEGER PRIMARY KEY, host TEXT, name TEXT, value TEXT, path TEXT, \
             expiry INTEGER, isSecure INTEGER, isHttpOnly INTEGER, sameSite INTEGER)",
            [],
        )
        .expect("create cookies");
        conn.execute(
            "INSERT INTO moz_cookies (host, name, value, path, expiry, isSecure, isHttpOnly, sameSite) \
             VALUES ('.google-analytics.com', '_ga', 'GA1', '/', 1700000000, 0, 0, 1)",
            [],
        )
        .expect("insert cookie");
        drop(conn);

        let store = BrowserCookieStore::open(&path).expect("open");
        assert_eq!(store.flavor(), CookieDbFlavor::Firefox);
        let cookies = store.list_cookies(None).expect("list");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].same_site, Some(SameSite::Lax));
        assert_eq!(cookies[0].expires.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn removes_cookie_by_identity() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("Cookies");
        let conn = create_chromium_db(&path);
        insert_chromium_cookie(&conn, ".criteo.com", "uid", "1", false, false);
        drop(conn);

        let store = BrowserCookieStore::open(&path).expect("open");
        let key = CookieKey::new(".criteo.com", "uid", None);
        assert!(store.remove_cookie(&key).expect("remove"));
        assert!(!store.remove_cookie(&key).expect("remove again"));
        assert!(store.list_cookies(None).expect("list").is_empty());
    }

    #[test]
    fn rejects_unknown_schema() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("other.db");
        let conn = Connection::open(&path).expect("conn");
        conn.execute("CREATE TABLE things (id INTEGER)", []).expect("create");
        drop(conn);

        assert!(matches!(
            BrowserCookieStore::open(&path),
            Err(MonitorError::UnsupportedCookieStore(_))
        ));
    }

    #[test]
    fn webkit_epoch_conversion() {
        let dt = webkit_timestamp_to_datetime(13_303_449_600_000_000).unwrap();
        assert_eq!(dt.timestamp(), 13_303_449_600 - WEBKIT_EPOCH_OFFSET_SECS);
        assert!(webkit_timestamp_to_datetime(0).is_none());
    }
}
