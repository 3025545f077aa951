use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};

use crate::domain::order::UserId;

use super::ApiError;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity taken from the `X-User-Id` header
///
/// Authentication happens upstream; this service trusts the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(user_from(req))
    }
}

fn user_from(req: &HttpRequest) -> Result<CurrentUser, ApiError> {
    let value = req
        .headers()
        .get(USER_ID_HEADER)
        .ok_or(ApiError::MissingUser)?;

    let text = value
        .to_str()
        .map_err(|_| ApiError::InvalidUser("not valid text".to_string()))?;

    text.trim()
        .parse::<UserId>()
        .map(CurrentUser)
        .map_err(|_| ApiError::InvalidUser(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_header_is_parsed() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, " 17 "))
            .to_http_request();
        assert_eq!(user_from(&req).unwrap(), CurrentUser(17));
    }

    #[test]
    fn test_missing_or_bad_header() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(user_from(&req), Err(ApiError::MissingUser)));

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "alice"))
            .to_http_request();
        assert!(matches!(user_from(&req), Err(ApiError::InvalidUser(_))));
    }
}
