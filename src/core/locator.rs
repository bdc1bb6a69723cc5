//! 下载地址的分类、规范化和坐标解析
//!
//! 三种形式：
//! - 直接地址：传输层可以直接获取，例如 `file:///tmp/a.jar`、`https://host/a.jar`
//! - 坐标：`mvn:groupId/artifactId/version[/type[/classifier]]`，交给解析器
//! - 包装地址：包装前缀内嵌一个坐标，例如 `wrap:mvn:org.foo/bar/1.0$Bundle-Name=bar`

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::core::error::DownloadError;

pub const COORDINATE_SCHEME: &str = "mvn:";

/// 可以包装内层坐标的前缀
pub const WRAPPER_SCHEMES: [&str; 5] = ["wrap", "war", "webbundle", "blueprint", "spring"];

fn repository_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mvn:[a-zA-Z][a-zA-Z0-9+.\-]*:[^!$?\s]*!").expect("repository prefix regex")
    })
}

fn strip_repository(url: &str) -> String {
    repository_prefix()
        .replace_all(url.trim(), COORDINATE_SCHEME)
        .into_owned()
}

/// 坐标写成规范形式，`mvn:g/a/v/jar` 和 `mvn:g/a/v` 是同一个制品；解析失败的原样保留
fn canonical_coordinate(text: &str) -> String {
    text.parse::<Coordinate>()
        .map(|c| c.to_string())
        .unwrap_or_else(|_| text.to_string())
}

/// 规范化：去掉首尾空白，去掉坐标里显式指定的仓库 (`mvn:<repo>!g/a/v` -> `mvn:g/a/v`)，
/// 坐标（包括包装地址内层的坐标）写成规范形式
pub fn normalize(url: &str) -> String {
    let stripped = strip_repository(url);
    match Locator::classify(&stripped) {
        Locator::Coordinate(coordinate) => canonical_coordinate(&coordinate),
        Locator::Wrapped(wrapped) => format!(
            "{}{}{}",
            wrapped.prefix,
            canonical_coordinate(&wrapped.inner),
            wrapped.suffix
        ),
        Locator::Direct(direct) => direct,
    }
}

/// 地址分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Direct(String),
    Coordinate(String),
    Wrapped(WrappedLocator),
}

impl Locator {
    /// 纯字符串分类，不做任何 IO
    pub fn classify(url: &str) -> Locator {
        if url.starts_with(COORDINATE_SCHEME) {
            return Locator::Coordinate(url.to_string());
        }

        let mut rest = url;
        while let Some(after) = strip_wrapper(rest) {
            rest = after;
        }
        if rest.len() == url.len() || !rest.starts_with(COORDINATE_SCHEME) {
            return Locator::Direct(url.to_string());
        }

        let prefix_len = url.len() - rest.len();
        let inner_len = rest.find(['$', '?']).unwrap_or(rest.len());
        Locator::Wrapped(WrappedLocator {
            original: url.to_string(),
            prefix: url[..prefix_len].to_string(),
            inner: rest[..inner_len].to_string(),
            suffix: rest[inner_len..].to_string(),
        })
    }

}

fn strip_wrapper(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once(':')?;
    WRAPPER_SCHEMES.contains(&scheme).then_some(rest)
}

/// 去掉所有包装前缀和后缀，返回被包装的地址；不是包装形式时原样返回
pub fn unwrap_direct(url: &str) -> &str {
    let mut rest = url;
    while let Some(after) = strip_wrapper(rest) {
        rest = after;
    }
    if rest.len() == url.len() {
        return url;
    }
    let end = rest.find(['$', '?']).unwrap_or(rest.len());
    &rest[..end]
}

/// 包装地址：`prefix` + `inner` + `suffix`
///
/// 改写时只替换 `inner` 这一段，不做文本搜索替换，
/// 内层坐标文本在外层地址其他位置重复出现也不会被误改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedLocator {
    original: String,
    prefix: String,
    inner: String,
    suffix: String,
}

impl WrappedLocator {
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn inner(&self) -> &str {
        &self.inner
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// 用本地文件引用替换内层坐标
    pub fn rewrite(&self, local: &Path) -> String {
        format!("{}{}{}", self.prefix, file_reference(local), self.suffix)
    }

    /// 改写后的地址是否有进展
    ///
    /// 不能等于原地址，不能仍然包装同一个坐标，也不能回到链上任何一个祖先地址
    /// （`ancestors` 是规范化后的地址）。
    pub fn check_progress(&self, rewritten: &str, ancestors: &[String]) -> Result<(), DownloadError> {
        let cyclic = || Err(DownloadError::CyclicRewrite(self.original.clone()));
        if rewritten == self.original {
            return cyclic();
        }
        if let Locator::Wrapped(next) = Locator::classify(rewritten) {
            if canonical_coordinate(&next.inner) == canonical_coordinate(&self.inner) {
                return cyclic();
            }
        }
        let key = normalize(rewritten);
        if key == normalize(&self.original) || ancestors.contains(&key) {
            return cyclic();
        }
        Ok(())
    }
}

/// 本地路径转为 `file://` URL
///
/// 相对路径先按当前目录补全，传输层只接受绝对的文件地址。
pub fn file_reference(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match Url::from_file_path(&absolute) {
        Ok(url) => url.to_string(),
        Err(()) => absolute.to_string_lossy().into_owned(),
    }
}

/// 制品坐标 `mvn:groupId/artifactId/version[/type[/classifier]]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub packaging: String,
    pub classifier: Option<String>,
}

impl Coordinate {
    pub fn parse(url: &str) -> Result<Self, DownloadError> {
        url.parse()
    }

    /// 仓库布局下的相对路径
    pub fn repository_path(&self) -> String {
        let classifier = self
            .classifier
            .as_deref()
            .map(|c| format!("-{}", c))
            .unwrap_or_default();
        format!(
            "{}/{}/{}/{}-{}{}.{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.artifact_id,
            self.version,
            classifier,
            self.packaging
        )
    }

    pub fn file_name(&self) -> String {
        match self.repository_path().rsplit_once('/') {
            Some((_, name)) => name.to_string(),
            None => self.repository_path(),
        }
    }
}

impl FromStr for Coordinate {
    type Err = DownloadError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid = || DownloadError::InvalidCoordinate(url.to_string());
        let body = strip_repository(url);
        let body = body.strip_prefix(COORDINATE_SCHEME).ok_or_else(invalid)?;

        let parts: Vec<&str> = body.split('/').collect();
        if !(3..=5).contains(&parts.len()) || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid());
        }
        if parts.iter().any(|p| p.contains(['$', '?', '!', ' '])) {
            return Err(invalid());
        }

        Ok(Coordinate {
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts[2].to_string(),
            packaging: parts.get(3).copied().unwrap_or("jar").to_string(),
            classifier: parts.get(4).map(|c| c.to_string()),
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}/{}", COORDINATE_SCHEME, self.group_id, self.artifact_id, self.version)?;
        if self.packaging != "jar" || self.classifier.is_some() {
            write!(f, "/{}", self.packaging)?;
        }
        if let Some(classifier) = &self.classifier {
            write!(f, "/{}", classifier)?;
        }
        Ok(())
    }
}
