//! Jira connector (§4.4, §8 scenario 4): issues addressed by key, with a
//! supplemented behavior carried over from the original implementation:
//! comments that are nothing but a Microsoft Teams conversation link are
//! omitted from the rendered body and instead emitted as a `parent`
//! relation from the issue to the linked Teams message (so the message
//! shows up as a child resource rather than inline text noise).

use crate::config::{basic_auth_header, bearer_auth_header};
use crate::connector::{Connector, JiraIssueLocator, Locator, ObserveResult, PostProcessing, Reference, ResolveResult, TeamsMessageLocator};
use crate::content::{Bundle, Fragment};
use crate::downloader::Downloader;
use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::field::FieldDelta;
use crate::metadata::MetadataDelta;
use crate::relation::Relation;
use crate::uri::{Affordance, Realm, WebUrl};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct JiraConnector {
    realm: Realm,
    domain: String,
    public_username: Option<String>,
    public_token: Option<String>,
    downloader: Arc<dyn Downloader>,
}

impl JiraConnector {
    pub fn new(
        realm: Realm,
        domain: String,
        public_username: Option<String>,
        public_token: Option<String>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        JiraConnector { realm, domain, public_username, public_token, downloader }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let (Some(username), Some(token)) = (&self.public_username, &self.public_token) {
            headers.insert("Authorization".to_string(), basic_auth_header(username, token));
        } else if let Some(token) = &self.public_token {
            headers.insert("Authorization".to_string(), bearer_auth_header(token));
        }
        headers
    }
}

#[derive(Deserialize)]
struct JiraIssueDto {
    fields: JiraFieldsDto,
}

#[derive(Deserialize)]
struct JiraFieldsDto {
    summary: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    comment: Option<JiraCommentsDto>,
}

#[derive(Deserialize)]
struct JiraCommentsDto {
    #[serde(default)]
    comments: Vec<JiraCommentDto>,
}

#[derive(Deserialize)]
struct JiraCommentDto {
    body: String,
}

#[async_trait]
impl Connector for JiraConnector {
    fn realm(&self) -> &Realm {
        &self.realm
    }

    async fn locator(&self, reference: &Reference) -> GatewayResult<Option<Locator>> {
        let Reference::Web(url) = reference else { return Ok(None) };
        if url.host() != Some(self.domain.as_str()) {
            return Ok(None);
        }
        let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
        if segments.len() == 2 && segments[0] == "browse" {
            return Ok(Some(Locator::JiraIssue(JiraIssueLocator {
                domain: self.domain.clone(),
                issue_key: segments[1].to_string(),
            })));
        }
        Ok(None)
    }

    async fn resolve(&self, locator: &Locator, _cached: Option<&MetadataDelta>) -> GatewayResult<ResolveResult> {
        let Locator::JiraIssue(_) = locator else { return Err(GatewayError::unavailable()) };
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
        let dto: JiraIssueDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let mut metadata = MetadataDelta::default();
        metadata.name = FieldDelta::Set(dto.fields.summary);
        metadata.description = dto.fields.description.map(FieldDelta::Set).unwrap_or(FieldDelta::Unset);
        metadata.citation_url = locator.citation_url().map(FieldDelta::Set).unwrap_or(FieldDelta::Unset);
        Ok(ResolveResult { metadata, expired: Vec::new(), should_cache: true })
    }

    async fn observe(&self, locator: &Locator, observable: Affordance, _resolved: &ResolveResult) -> GatewayResult<ObserveResult> {
        if observable != Affordance::Body {
            return Err(GatewayError::bad_request(observable));
        }
        let Locator::JiraIssue(issue) = locator else { return Err(GatewayError::bad_request(observable)) };
        let url = locator.content_url().ok_or_else(GatewayError::unavailable)?;
        let (value, _) = self.downloader.fetch_json(&url, Some(&self.headers())).await?;
        let dto: JiraIssueDto = serde_json::from_value(value).map_err(|e| GatewayError::download(0, e.to_string()))?;

        let mut text = dto.fields.description.clone().unwrap_or_default();
        let mut relations = Vec::new();
        for comment in dto.fields.comment.map(|c| c.comments).unwrap_or_default() {
            match parse_teams_link_comment(&comment.body) {
                Some(teams) => {
                    relations.push(Relation::Parent {
                        parent: locator.resource_uri(),
                        child: Locator::TeamsMessage(teams).resource_uri(),
                    });
                }
                None => {
                    text.push_str("\n\n---\n");
                    text.push_str(&comment.body);
                }
            }
        }

        Ok(ObserveResult {
            bundle: Bundle::Fragment(Fragment::markdown(text)),
            observed: None,
            relations,
            post_processing: PostProcessing { cache: true, extract_label: true, parent_relations: true, ..Default::default() },
        })
    }
}

/// Match a comment whose sole content is a `[Microsoft Teams
/// conversation|https://teams.microsoft.com/l/message/{thread}/{message}?groupId={group}]`
/// Jira wiki-markup link (§8 scenario 4), returning the referenced locator.
fn parse_teams_link_comment(body: &str) -> Option<TeamsMessageLocator> {
    let trimmed = body.trim();
    let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?;
    let (_label, href) = inner.split_once('|')?;
    let url = WebUrl::try_decode(href).ok()?;
    if url.host() != Some("teams.microsoft.com") {
        return None;
    }
    let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
    // `/l/message/{thread_id}/{message_id}`
    if segments.len() != 4 || segments[0] != "l" || segments[1] != "message" {
        return None;
    }
    let group_id = url.get_query("groupId")?;
    Some(TeamsMessageLocator {
        group_id,
        thread_id: segments[2].to_string(),
        message_id: segments[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_teams_link_comment() {
        let body = "[Microsoft Teams conversation|https://teams.microsoft.com/l/message/19:abc@thread.tacv2/1700000000?groupId=11111111-1111-1111-1111-111111111111]";
        let locator = parse_teams_link_comment(body).unwrap();
        assert_eq!(locator.thread_id, "19:abc@thread.tacv2");
        assert_eq!(locator.message_id, "1700000000");
        assert_eq!(locator.group_id, "11111111-1111-1111-1111-111111111111");
    }

    #[test]
    fn rejects_non_teams_comment() {
        assert!(parse_teams_link_comment("just a regular comment").is_none());
    }
}
