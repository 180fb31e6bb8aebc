//! Server-rendered HTML pages. There is no static asset pipeline; the two
//! pages the daemon serves are embedded here.

/// The login form, served on `/public/loginForm` and as the body of 401
/// responses when the caller accepts HTML.
pub const LOGIN_FORM: &str = r#"<!DOCTYPE html>
<html>
<head><title>keywarden login</title></head>
<body>
<h1>Sign in</h1>
<form action="/api/v0/login" method="post">
  <p><label>Username <input type="text" name="username" autofocus></label></p>
  <p><label>Password <input type="password" name="password"></label></p>
  <p><input type="submit" value="Login"></p>
</form>
</body>
</html>
"#;

/// The credential management page served on `/profile/`.
pub fn profile_page(username: &str, credential_count: usize) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>keywarden profile</title></head>
<body>
<h1>Profile: {username}</h1>
<p>Registered second factors: {credential_count}</p>
<ul>
  <li><a href="/u2f/RegisterRequest">Register a new second factor</a></li>
  <li><a href="/u2f/SignRequest">Authenticate with a second factor</a></li>
  <li><a href="/certgen/{username}">Request an SSH certificate</a></li>
  <li><a href="/public/x509ca">Download the CA certificate</a></li>
</ul>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn profile_page_names_the_user() {
        let page = profile_page("alice", 2);
        assert!(page.contains("alice"));
        assert!(page.contains("Registered second factors: 2"));
    }
}
