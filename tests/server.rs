use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use foundry::{serve_listener, Application, Error, Request, Response, ServiceProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn exchange(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_requests_and_runs_finish_after_send() {
    let finished = Arc::new(AtomicUsize::new(0));

    let mut app = Application::new();
    app.router_mut().get("/hello/{name}", |_: &Application, req: &Request| {
        format!("hello {}", req.param("name").unwrap_or("?"))
    });
    app.router_mut().post("/echo", |_: &Application, req: &Request| {
        format!("name={}", req.input("name").unwrap_or(""))
    });
    let counter = Arc::clone(&finished);
    app.finish(move |_: &Request, _: &Response| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(listener, Arc::new(app), async {
        let _ = stopped.await;
    }));

    let reply = exchange(addr, "GET /hello/ada HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK"), "{reply}");
    assert!(reply.contains("content-length: 9"), "{reply}");
    assert!(reply.ends_with("hello ada"), "{reply}");

    let form = "name=grace";
    let raw = format!(
        "POST /echo HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\
         content-type: application/x-www-form-urlencoded\r\ncontent-length: {}\r\n\r\n{form}",
        form.len()
    );
    let reply = exchange(addr, &raw).await;
    assert!(reply.ends_with("name=grace"), "{reply}");

    let reply = exchange(addr, "GET /missing HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 404"), "{reply}");

    // Finish hooks run on the blocking pool once hyper drops the body.
    for _ in 0..50 {
        if finished.load(Ordering::SeqCst) == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(finished.load(Ordering::SeqCst), 3);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn boot_failure_stops_the_server_before_accepting() {
    struct Failing;

    impl ServiceProvider for Failing {
        fn name(&self) -> &str {
            "db"
        }

        fn boot(&self, _: &Application) -> Result<(), Error> {
            Err(Error::handler("connection refused"))
        }
    }

    let mut app = Application::new();
    app.router_mut().get("/", |_: &Application, _: &Request| "home");
    app.register(Failing);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        serve_listener(listener, Arc::new(app), std::future::pending()),
    )
    .await
    .expect("serve_listener should return on boot failure");

    assert!(matches!(result, Err(Error::Boot { ref provider, .. }) if provider == "db"));
}
