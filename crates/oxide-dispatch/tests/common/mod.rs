#![allow(dead_code)]

use oxide_dispatch::{handler_fn, Handler, Method, Next, Request};

/// A handler that sends a fixed text body.
pub fn send(body: &'static str) -> impl Handler {
    handler_fn(move |_req, res| {
        res.send(body);
        Next::Continue
    })
}

/// A handler that sends one named path parameter.
pub fn send_param(name: &'static str) -> impl Handler {
    handler_fn(move |req, res| {
        let value = req.params.get(name).unwrap_or_default().to_string();
        res.send(value);
        Next::Continue
    })
}

/// A handler that sends only a status.
pub fn status(code: u16) -> impl Handler {
    handler_fn(move |_req, res| {
        res.send_status(code);
        Next::Continue
    })
}

/// A request that asks for plain text, so bodies compare raw.
pub fn text_request(method: Method, url: &str) -> Request {
    Request::new(method, url).header("Accept", "text/plain")
}

/// A GET with an `accept-version` header.
pub fn versioned_get(url: &str, range: &str) -> Request {
    Request::get(url).header("accept-version", range)
}
