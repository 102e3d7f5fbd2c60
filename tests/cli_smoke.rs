use predicates::prelude::*;

const BASE_PATH: &str = "/maquinaexpendedora/api/maquina";

#[test]
fn classify_prints_severity() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.args(["classify", "Producto agotado"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::diff("warning\n"));
}

#[test]
fn classify_explain_names_the_rule() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.args([
        "classify",
        "--explain",
        "Error: Producto dispensado. Gracias por su compra",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("error (rule: error-prefix)"));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.args(["classify", "--explain", ""]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("info (fallback)"));
}

#[test]
fn out_of_range_interval_is_rejected() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.args(["--state-interval-ms", "5", "status"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--state-interval-ms"));
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("--api-base-url"));
}

#[test]
fn custom_amount_below_minimum_fails_without_backend() {
    // Nothing listens here; the amount is refused before any request.
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.env("VENDING_API_BASE_URL", "http://127.0.0.1:9/maquinaexpendedora/api/maquina");
    cmd.args(["insert", "50"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("El monto mínimo es $100"));
}

#[tokio::test]
async fn status_reads_mock_backend() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/estado")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "OPERACION EXITOSA",
            "data": "ESPERANDO_PAGO"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/dinero-disponible")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "OPERACION EXITOSA",
            "data": 50000.0
        })))
        .mount(&server)
        .await;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.args([
        "--api-base-url",
        &format!("{}{BASE_PATH}", server.uri()),
        "status",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Estado: ESPERANDO_PAGO"))
        .stdout(predicate::str::contains("$50.000"));
}

#[tokio::test]
async fn dispense_rejection_exits_nonzero() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{BASE_PATH}/dispensar")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "success": false,
            "message": "Debe completar el pago antes de dispensar"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.env("RUST_LOG", "off");
    cmd.args([
        "--api-base-url",
        &format!("{}{BASE_PATH}", server.uri()),
        "dispense",
    ]);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains(
            "[warning] Debe completar el pago antes de dispensar",
        ));
}

#[tokio::test]
async fn current_without_transaction_is_not_an_error() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/transaccion-actual")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "success": false,
            "message": "No hay transacción en proceso"
        })))
        .mount(&server)
        .await;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.env("RUST_LOG", "off");
    cmd.args([
        "--api-base-url",
        &format!("{}{BASE_PATH}", server.uri()),
        "current",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "No hay ninguna transacción en proceso",
        ))
        .stderr(predicate::str::contains("Error").not());
}

#[tokio::test]
async fn insert_does_not_claim_an_empty_catalogue() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let ok = |data: serde_json::Value| {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "OPERACION EXITOSA",
            "data": data
        }))
    };
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{BASE_PATH}/insertar-dinero/5000")))
        .respond_with(ok(serde_json::json!(
            "Dinero insertado: $5000. Total: $5000. Presione confirmar para continuar."
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/productos")))
        .respond_with(ok(serde_json::json!({
            "A1": { "codigo": "A1", "nombre": "Coca-Cola", "precio": 4000.0, "stock": 10 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/estado")))
        .respond_with(ok(serde_json::json!("ESPERANDO_PAGO")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/dinero-disponible")))
        .respond_with(ok(serde_json::json!(50000.0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/transaccion-actual")))
        .respond_with(ok(serde_json::Value::Null))
        .mount(&server)
        .await;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("vending");
    cmd.env("RUST_LOG", "off");
    cmd.args([
        "--api-base-url",
        &format!("{}{BASE_PATH}", server.uri()),
        "insert",
        "5000",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Estado: ESPERANDO_PAGO"))
        .stdout(predicate::str::contains("No hay productos disponibles").not());
}
