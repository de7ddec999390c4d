//! The `Locator` sum type: one variant per connector backend, each carrying
//! the minimum fields needed to re-fetch it (§3.3). Reimplemented as a
//! closed tagged enum rather than a runtime subclass registry (§9 "Dynamic
//! union dispatch → tagged variants").

use crate::uri::{Realm, ResourceUri, Subrealm, WebUrl};
use serde::{Deserialize, Serialize};

fn realm(s: &str) -> Realm {
    Realm::decode(s)
}

fn subrealm(s: &str) -> Subrealm {
    Subrealm::decode(s)
}

fn web(url: String) -> WebUrl {
    WebUrl::try_decode(&url).unwrap_or_else(|_| panic!("locator built an invalid URL: {url}"))
}

/// Sanitize a git ref (which may contain `/` for branches like
/// `feature/x`) into a single `FileName`-safe path segment.
fn ref_segment(r#ref: &str) -> String {
    r#ref.replace('/', "_")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubRepoLocator {
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubBlobLocator {
    pub owner: String,
    pub repo: String,
    pub r#ref: String,
    pub is_default_branch: bool,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubTreeLocator {
    pub owner: String,
    pub repo: String,
    pub r#ref: String,
    pub is_default_branch: bool,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubCommitLocator {
    pub owner: String,
    pub repo: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubCompareLocator {
    pub owner: String,
    pub repo: String,
    pub base: String,
    pub head: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitLabProjectLocator {
    pub domain: String,
    pub group_path: Vec<String>,
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitLabBlobLocator {
    pub domain: String,
    pub group_path: Vec<String>,
    pub project: String,
    pub r#ref: String,
    pub is_default_branch: bool,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitLabTreeLocator {
    pub domain: String,
    pub group_path: Vec<String>,
    pub project: String,
    pub r#ref: String,
    pub is_default_branch: bool,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitLabCommitLocator {
    pub domain: String,
    pub group_path: Vec<String>,
    pub project: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitLabCompareLocator {
    pub domain: String,
    pub group_path: Vec<String>,
    pub project: String,
    pub base: String,
    pub head: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluencePageLocator {
    pub domain: String,
    pub space_key: String,
    pub page_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeorgesPageLocator {
    pub domain: String,
    pub page_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraIssueLocator {
    pub domain: String,
    pub issue_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamsMessageLocator {
    pub group_id: String,
    pub thread_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRailCaseLocator {
    pub domain: String,
    pub case_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArXivPaperLocator {
    pub paper_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YouTubeVideoLocator {
    pub video_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebPageLocator {
    pub url: WebUrl,
    /// Stable hash of `url`, used as the `ResourceUri` path when the path
    /// cannot otherwise be inferred (§3.2, §4.7 alias fallback).
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsDriveFileLocator {
    pub tenant_id: String,
    pub drive_id: String,
    pub item_id: String,
    pub item_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsSharePointFileLocator {
    pub tenant_id: String,
    pub site_id: String,
    pub drive_id: String,
    pub item_id: String,
    pub item_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsEmailLocator {
    pub tenant_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsChatMessageLocator {
    pub tenant_id: String,
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlobLocator {
    pub id: String,
}

/// The discriminated union of all backend locators. Every variant is
/// decoded from the same `kind` tag it was encoded with, so no runtime
/// subclass scan is required to round-trip through storage (§4.7, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Locator {
    GitHubRepo(GitHubRepoLocator),
    GitHubBlob(GitHubBlobLocator),
    GitHubTree(GitHubTreeLocator),
    GitHubCommit(GitHubCommitLocator),
    GitHubCompare(GitHubCompareLocator),
    GitLabProject(GitLabProjectLocator),
    GitLabBlob(GitLabBlobLocator),
    GitLabTree(GitLabTreeLocator),
    GitLabCommit(GitLabCommitLocator),
    GitLabCompare(GitLabCompareLocator),
    ConfluencePage(ConfluencePageLocator),
    GeorgesPage(GeorgesPageLocator),
    JiraIssue(JiraIssueLocator),
    TeamsMessage(TeamsMessageLocator),
    TestRailCase(TestRailCaseLocator),
    ArXivPaper(ArXivPaperLocator),
    YouTubeVideo(YouTubeVideoLocator),
    WebPage(WebPageLocator),
    MsDriveFile(MsDriveFileLocator),
    MsSharePointFile(MsSharePointFileLocator),
    MsEmail(MsEmailLocator),
    MsChatMessage(MsChatMessageLocator),
    ImageBlob(ImageBlobLocator),
}

impl Locator {
    /// The connector namespace this locator belongs to (§3.3 `realm`).
    /// Invariant (§8): `L.resource_uri().realm() == L.realm()`.
    pub fn realm(&self) -> Realm {
        match self {
            Locator::GitHubRepo(_)
            | Locator::GitHubBlob(_)
            | Locator::GitHubTree(_)
            | Locator::GitHubCommit(_)
            | Locator::GitHubCompare(_) => realm("github"),
            Locator::GitLabProject(_)
            | Locator::GitLabBlob(_)
            | Locator::GitLabTree(_)
            | Locator::GitLabCommit(_)
            | Locator::GitLabCompare(_) => realm("gitlab"),
            Locator::ConfluencePage(_) => realm("confluence"),
            Locator::GeorgesPage(_) => realm("georges"),
            Locator::JiraIssue(_) => realm("jira"),
            Locator::TeamsMessage(_) => realm("teams"),
            Locator::TestRailCase(_) => realm("testrail"),
            Locator::ArXivPaper(_) | Locator::YouTubeVideo(_) => realm("public"),
            Locator::WebPage(_) => realm("www"),
            Locator::MsDriveFile(_) | Locator::MsEmail(_) | Locator::MsChatMessage(_) => {
                realm("microsoft_my")
            }
            Locator::MsSharePointFile(_) => realm("microsoft_org"),
            Locator::ImageBlob(_) => realm("images"),
        }
    }

    /// The canonical internal address for this locator (§3.2, §3.3).
    pub fn resource_uri(&self) -> ResourceUri {
        match self {
            Locator::GitHubRepo(l) => ResourceUri::new(
                realm("github"),
                subrealm("repo"),
                format!("{}/{}", l.owner, l.repo),
            ),
            Locator::GitHubBlob(l) => github_file_uri(l.owner.as_str(), l.repo.as_str(), &l.r#ref, l.is_default_branch, &l.path),
            Locator::GitHubTree(l) => github_file_uri(l.owner.as_str(), l.repo.as_str(), &l.r#ref, l.is_default_branch, &l.path),
            Locator::GitHubCommit(l) => ResourceUri::new(
                realm("github"),
                subrealm("commit"),
                format!("{}/{}/{}", l.owner, l.repo, l.sha),
            ),
            Locator::GitHubCompare(l) => ResourceUri::new(
                realm("github"),
                subrealm("compare"),
                format!("{}/{}/{}_{}", l.owner, l.repo, l.base, l.head),
            ),
            Locator::GitLabProject(l) => ResourceUri::new(
                realm("gitlab"),
                subrealm("project"),
                format!("{}/{}", l.group_path.join("_"), l.project),
            ),
            Locator::GitLabBlob(l) => gitlab_file_uri(l),
            Locator::GitLabTree(l) => gitlab_file_uri(&GitLabBlobLocator {
                domain: l.domain.clone(),
                group_path: l.group_path.clone(),
                project: l.project.clone(),
                r#ref: l.r#ref.clone(),
                is_default_branch: l.is_default_branch,
                path: l.path.clone(),
            }),
            Locator::GitLabCommit(l) => ResourceUri::new(
                realm("gitlab"),
                subrealm("commit"),
                format!("{}/{}/{}", l.group_path.join("_"), l.project, l.sha),
            ),
            Locator::GitLabCompare(l) => ResourceUri::new(
                realm("gitlab"),
                subrealm("compare"),
                format!("{}/{}/{}_{}", l.group_path.join("_"), l.project, l.base, l.head),
            ),
            Locator::ConfluencePage(l) => ResourceUri::new(
                realm("confluence"),
                subrealm("page"),
                format!("{}/{}", l.space_key, l.page_id),
            ),
            Locator::GeorgesPage(l) => {
                ResourceUri::new(realm("georges"), subrealm("page"), l.page_id.clone())
            }
            Locator::JiraIssue(l) => {
                ResourceUri::new(realm("jira"), subrealm("issue"), l.issue_key.clone())
            }
            Locator::TeamsMessage(l) => ResourceUri::new(
                realm("teams"),
                subrealm("message"),
                format!("{}/{}/{}", l.group_id, l.thread_id, l.message_id),
            ),
            Locator::TestRailCase(l) => {
                ResourceUri::new(realm("testrail"), subrealm("case"), l.case_id.to_string())
            }
            Locator::ArXivPaper(l) => {
                ResourceUri::new(realm("public"), subrealm("arxiv"), l.paper_id.clone())
            }
            Locator::YouTubeVideo(l) => {
                ResourceUri::new(realm("public"), subrealm("youtube"), l.video_id.clone())
            }
            Locator::WebPage(l) => {
                ResourceUri::new(realm("www"), subrealm("page"), l.hash.clone())
            }
            Locator::MsDriveFile(l) => ResourceUri::new(
                realm("microsoft_my"),
                subrealm("drive"),
                format!("{}/{}", l.drive_id, l.item_path.join("/")),
            ),
            Locator::MsSharePointFile(l) => ResourceUri::new(
                realm("microsoft_org"),
                subrealm("drive"),
                format!("{}/{}/{}", l.site_id, l.drive_id, l.item_path.join("/")),
            ),
            Locator::MsEmail(l) => {
                ResourceUri::new(realm("microsoft_my"), subrealm("email"), l.message_id.clone())
            }
            Locator::MsChatMessage(l) => ResourceUri::new(
                realm("microsoft_my"),
                subrealm("chat"),
                format!("{}/{}", l.channel_id, l.message_id),
            ),
            Locator::ImageBlob(l) => {
                ResourceUri::new(realm("images"), subrealm("blob"), l.id.clone())
            }
        }
    }

    /// The source-system URL to follow for bytes (§3.3 `content_url()`).
    pub fn content_url(&self) -> Option<WebUrl> {
        match self {
            Locator::GitHubRepo(l) => Some(web(format!(
                "https://api.github.com/repos/{}/{}",
                l.owner, l.repo
            ))),
            Locator::GitHubBlob(l) => Some(web(format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                l.owner,
                l.repo,
                l.r#ref,
                l.path.join("/")
            ))),
            Locator::GitHubTree(l) => Some(web(format!(
                "https://api.github.com/repos/{}/{}/contents/{}?ref={}",
                l.owner,
                l.repo,
                l.path.join("/"),
                l.r#ref
            ))),
            Locator::GitHubCommit(l) => Some(web(format!(
                "https://api.github.com/repos/{}/{}/commits/{}",
                l.owner, l.repo, l.sha
            ))),
            Locator::GitHubCompare(l) => Some(web(format!(
                "https://api.github.com/repos/{}/{}/compare/{}...{}",
                l.owner, l.repo, l.base, l.head
            ))),
            Locator::GitLabProject(l) => Some(web(format!(
                "https://{}/api/v4/projects/{}",
                l.domain,
                percent_encoding::utf8_percent_encode(
                    &format!("{}/{}", l.group_path.join("/"), l.project),
                    percent_encoding::NON_ALPHANUMERIC
                )
            ))),
            Locator::GitLabBlob(l) | Locator::GitLabTree(l) => Some(web(format!(
                "https://{}/api/v4/projects/{}/repository/files/{}/raw?ref={}",
                l.domain,
                percent_encoding::utf8_percent_encode(
                    &format!("{}/{}", l.group_path.join("/"), l.project),
                    percent_encoding::NON_ALPHANUMERIC
                ),
                percent_encoding::utf8_percent_encode(&l.path.join("/"), percent_encoding::NON_ALPHANUMERIC),
                l.r#ref
            ))),
            Locator::GitLabCommit(l) => Some(web(format!(
                "https://{}/api/v4/projects/{}/repository/commits/{}",
                l.domain,
                percent_encoding::utf8_percent_encode(
                    &format!("{}/{}", l.group_path.join("/"), l.project),
                    percent_encoding::NON_ALPHANUMERIC
                ),
                l.sha
            ))),
            Locator::GitLabCompare(l) => Some(web(format!(
                "https://{}/api/v4/projects/{}/repository/compare?from={}&to={}",
                l.domain,
                percent_encoding::utf8_percent_encode(
                    &format!("{}/{}", l.group_path.join("/"), l.project),
                    percent_encoding::NON_ALPHANUMERIC
                ),
                l.base,
                l.head
            ))),
            Locator::ConfluencePage(l) => Some(web(format!(
                "https://{}/wiki/rest/api/content/{}?expand=body.storage",
                l.domain, l.page_id
            ))),
            Locator::GeorgesPage(l) => {
                Some(web(format!("https://{}/pages/{}", l.domain, l.page_id)))
            }
            Locator::JiraIssue(l) => Some(web(format!(
                "https://{}/rest/api/2/issue/{}",
                l.domain, l.issue_key
            ))),
            Locator::TeamsMessage(_) => None,
            Locator::TestRailCase(l) => Some(web(format!(
                "https://{}/index.php?/api/v2/get_case/{}",
                l.domain, l.case_id
            ))),
            Locator::ArXivPaper(l) => {
                Some(web(format!("https://arxiv.org/abs/{}", l.paper_id)))
            }
            Locator::YouTubeVideo(l) => Some(web(format!(
                "https://www.youtube.com/watch?v={}",
                l.video_id
            ))),
            Locator::WebPage(l) => Some(l.url.clone()),
            Locator::MsDriveFile(l) => Some(web(format!(
                "https://graph.microsoft.com/v1.0/me/drive/items/{}",
                l.item_id
            ))),
            Locator::MsSharePointFile(l) => Some(web(format!(
                "https://graph.microsoft.com/v1.0/sites/{}/drives/{}/items/{}",
                l.site_id, l.drive_id, l.item_id
            ))),
            Locator::MsEmail(l) => Some(web(format!(
                "https://graph.microsoft.com/v1.0/me/messages/{}",
                l.message_id
            ))),
            Locator::MsChatMessage(l) => Some(web(format!(
                "https://graph.microsoft.com/v1.0/teams/{}/channels/.../messages/{}",
                l.channel_id, l.message_id
            ))),
            Locator::ImageBlob(l) => Some(web(format!(
                "https://images.internal/blobs/{}",
                l.id
            ))),
        }
    }

    /// The URL shown to a human for attribution (§3.3 `citation_url()`);
    /// may equal `content_url()`, may be `None`.
    pub fn citation_url(&self) -> Option<WebUrl> {
        match self {
            Locator::GitHubRepo(l) => Some(web(format!(
                "https://github.com/{}/{}",
                l.owner, l.repo
            ))),
            Locator::GitHubBlob(l) => Some(web(format!(
                "https://github.com/{}/{}/blob/{}/{}",
                l.owner,
                l.repo,
                l.r#ref,
                l.path.join("/")
            ))),
            Locator::GitHubTree(l) => Some(web(format!(
                "https://github.com/{}/{}/tree/{}/{}",
                l.owner,
                l.repo,
                l.r#ref,
                l.path.join("/")
            ))),
            Locator::GitHubCommit(l) => Some(web(format!(
                "https://github.com/{}/{}/commit/{}",
                l.owner, l.repo, l.sha
            ))),
            Locator::GitHubCompare(l) => Some(web(format!(
                "https://github.com/{}/{}/compare/{}...{}",
                l.owner, l.repo, l.base, l.head
            ))),
            Locator::GitLabProject(l) => Some(web(format!(
                "https://{}/{}/{}",
                l.domain,
                l.group_path.join("/"),
                l.project
            ))),
            Locator::GitLabBlob(l) => Some(web(format!(
                "https://{}/{}/{}/-/blob/{}/{}",
                l.domain,
                l.group_path.join("/"),
                l.project,
                l.r#ref,
                l.path.join("/")
            ))),
            Locator::GitLabTree(l) => Some(web(format!(
                "https://{}/{}/{}/-/tree/{}/{}",
                l.domain,
                l.group_path.join("/"),
                l.project,
                l.r#ref,
                l.path.join("/")
            ))),
            Locator::GitLabCommit(l) => Some(web(format!(
                "https://{}/{}/{}/-/commit/{}",
                l.domain,
                l.group_path.join("/"),
                l.project,
                l.sha
            ))),
            Locator::GitLabCompare(l) => Some(web(format!(
                "https://{}/{}/{}/-/compare/{}...{}",
                l.domain,
                l.group_path.join("/"),
                l.project,
                l.base,
                l.head
            ))),
            Locator::ConfluencePage(l) => Some(web(format!(
                "https://{}/wiki/spaces/{}/pages/{}",
                l.domain, l.space_key, l.page_id
            ))),
            Locator::GeorgesPage(l) => {
                Some(web(format!("https://{}/pages/{}", l.domain, l.page_id)))
            }
            Locator::JiraIssue(l) => {
                Some(web(format!("https://{}/browse/{}", l.domain, l.issue_key)))
            }
            Locator::TeamsMessage(l) => Some(web(format!(
                "https://teams.microsoft.com/l/message/{}/{}?groupId={}",
                l.thread_id, l.message_id, l.group_id
            ))),
            Locator::TestRailCase(l) => Some(web(format!(
                "https://{}/index.php?/cases/view/{}",
                l.domain, l.case_id
            ))),
            Locator::ArXivPaper(l) => {
                Some(web(format!("https://arxiv.org/abs/{}", l.paper_id)))
            }
            Locator::YouTubeVideo(l) => Some(web(format!(
                "https://www.youtube.com/watch?v={}",
                l.video_id
            ))),
            Locator::WebPage(l) => Some(l.url.clone()),
            Locator::MsDriveFile(_) | Locator::MsSharePointFile(_) => None,
            Locator::MsEmail(_) | Locator::MsChatMessage(_) => None,
            Locator::ImageBlob(_) => None,
        }
    }
}

fn github_file_uri(owner: &str, repo: &str, r#ref: &str, is_default_branch: bool, path: &[String]) -> ResourceUri {
    if is_default_branch {
        ResourceUri::new(
            realm("github"),
            subrealm("file"),
            format!("{owner}/{repo}/{}", path.join("/")),
        )
    } else {
        ResourceUri::new(
            realm("github"),
            subrealm("ref"),
            format!("{owner}/{repo}/{}/{}", ref_segment(r#ref), path.join("/")),
        )
    }
}

fn gitlab_file_uri(l: &GitLabBlobLocator) -> ResourceUri {
    let group = l.group_path.join("_");
    if l.is_default_branch {
        ResourceUri::new(
            realm("gitlab"),
            subrealm("file"),
            format!("{group}/{}/{}", l.project, l.path.join("/")),
        )
    } else {
        ResourceUri::new(
            realm("gitlab"),
            subrealm("ref"),
            format!(
                "{group}/{}/{}/{}",
                l.project,
                ref_segment(&l.r#ref),
                l.path.join("/")
            ),
        )
    }
}
