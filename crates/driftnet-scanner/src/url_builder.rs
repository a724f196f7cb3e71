use driftnet_core::{CandidateName, RegionCode};

/// Addressing styles of the object-storage REST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStyle {
    /// `https://<bucket>.s3.<region>.amazonaws.com`
    VirtualHosted,
    /// `https://s3.<region>.amazonaws.com/<bucket>`
    PathStyle,
}

impl EndpointStyle {
    /// Styles in the order they are tried.
    pub const ALL: [EndpointStyle; 2] = [EndpointStyle::VirtualHosted, EndpointStyle::PathStyle];
}

pub fn build_bucket_url(bucket: &CandidateName, region: RegionCode, style: EndpointStyle) -> String {
    match style {
        EndpointStyle::VirtualHosted => format!("https://{bucket}.s3.{region}.amazonaws.com"),
        EndpointStyle::PathStyle => format!("https://s3.{region}.amazonaws.com/{bucket}"),
    }
}

/// URL of `bucket` behind a fixed `base` such as a local mirror.
///
/// The host the public endpoint would use becomes the first path segment,
/// so both styles stay distinguishable on a single listener.
pub fn build_bucket_url_at(
    base: &str,
    bucket: &CandidateName,
    region: RegionCode,
    style: EndpointStyle,
) -> String {
    let base = base.trim_end_matches('/');
    match style {
        EndpointStyle::VirtualHosted => format!("{base}/{bucket}.s3.{region}"),
        EndpointStyle::PathStyle => format!("{base}/s3.{region}/{bucket}"),
    }
}

/// Every endpoint for a pair, in probe order. `base` replaces the public
/// endpoints when set.
pub fn bucket_urls(base: Option<&str>, bucket: &CandidateName, region: RegionCode) -> Vec<String> {
    EndpointStyle::ALL
        .iter()
        .map(|style| match base {
            Some(base) => build_bucket_url_at(base, bucket, region, *style),
            None => build_bucket_url(bucket, region, *style),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> CandidateName {
        CandidateName::new("acme-prod").expect("valid bucket")
    }

    #[test]
    fn test_virtual_hosted_url() {
        assert_eq!(
            build_bucket_url(&bucket(), RegionCode::UsEast1, EndpointStyle::VirtualHosted),
            "https://acme-prod.s3.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn test_path_style_url() {
        assert_eq!(
            build_bucket_url(&bucket(), RegionCode::EuWest1, EndpointStyle::PathStyle),
            "https://s3.eu-west-1.amazonaws.com/acme-prod"
        );
    }

    #[test]
    fn test_virtual_hosted_is_tried_first() {
        let urls = bucket_urls(None, &bucket(), RegionCode::UsEast1);
        assert_eq!(urls.len(), 2);
        assert!(urls[0].starts_with("https://acme-prod."));
    }

    #[test]
    fn test_custom_base_keeps_both_styles() {
        let urls = bucket_urls(Some("http://127.0.0.1:9000/"), &bucket(), RegionCode::EuWest1);
        assert_eq!(
            urls,
            vec![
                "http://127.0.0.1:9000/acme-prod.s3.eu-west-1".to_string(),
                "http://127.0.0.1:9000/s3.eu-west-1/acme-prod".to_string(),
            ]
        );
    }
}
