//! Build-event topic definitions

/// Default name of the shared build-progress exchange
pub const BUILD_IMAGE_EXCHANGE: &str = "build_image";

/// Build-event topic patterns
pub struct Topics;

impl Topics {
    /// Per-deploy build-progress topic
    pub fn build_events(exchange: &str, deploy_id: &str) -> String {
        format!("{}/{}", exchange, deploy_id)
    }

    /// Parse a build-progress topic to extract the deploy ID
    pub fn parse_deploy_id<'a>(exchange: &str, topic: &'a str) -> Option<&'a str> {
        let deploy_id = topic.strip_prefix(exchange)?.strip_prefix('/')?;
        if deploy_id.is_empty() || deploy_id.contains('/') {
            None
        } else {
            Some(deploy_id)
        }
    }

    /// Reject ids that would escape the per-deploy topic
    pub fn is_valid_deploy_id(deploy_id: &str) -> bool {
        !deploy_id.is_empty() && !deploy_id.contains(['/', '+', '#'])
    }
}
