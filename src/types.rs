use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved address, produced by the postal-code resolver or the smart lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressResult {
    /// Always 8 ASCII digits, no punctuation
    pub postal_code: String,
    pub city: String,
    /// Two-letter uppercase state code (UF)
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_address: Option<String>,
}

impl fmt::Display for AddressResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.full_address {
            Some(line) => write!(f, "{}", line),
            None => write!(f, "{}/{}", self.city, self.state),
        }
    }
}

/// Result of a "use my location" action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationResult {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line: Option<String>,
}

/// A single labelled phone number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneEntry {
    pub label: String,
    pub number: String,
}

impl PhoneEntry {
    pub fn new(label: &str, number: &str) -> Self {
        Self {
            label: label.to_string(),
            number: number.to_string(),
        }
    }

    /// `tel:` link with punctuation stripped
    pub fn link(&self) -> String {
        crate::postal_code::phone_link(&self.number)
    }
}

/// One organization (municipal hall or utility) and how to reach it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContact {
    #[serde(alias = "name", alias = "company")]
    pub organization: String,
    pub phones: Vec<PhoneEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Contact bundle for a city
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityContacts {
    pub city: String,
    pub state: String,
    pub prefeitura: ServiceContact,
    pub energia: ServiceContact,
    pub agua: ServiceContact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<ServiceContact>,
}

impl CityContacts {
    /// Services in display order, gas only when the city has one
    pub fn services(&self) -> Vec<(ServiceKind, &ServiceContact)> {
        let mut services = vec![
            (ServiceKind::Prefeitura, &self.prefeitura),
            (ServiceKind::Energia, &self.energia),
            (ServiceKind::Agua, &self.agua),
        ];
        if let Some(gas) = &self.gas {
            services.push((ServiceKind::Gas, gas));
        }
        services
    }
}

/// Service category of a `ServiceContact`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Prefeitura,
    Energia,
    Agua,
    Gas,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefeitura => write!(f, "Prefeitura"),
            Self::Energia => write!(f, "Energia"),
            Self::Agua => write!(f, "Água"),
            Self::Gas => write!(f, "Gás"),
        }
    }
}

/// Nationwide emergency line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmergencyNumber {
    pub key: &'static str,
    pub number: &'static str,
    pub label: &'static str,
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Chat message in an open session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// The `erro` field of the postal-code service: `true` or `"true"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorFlag {
    Bool(bool),
    Text(String),
}

impl ErrorFlag {
    pub fn is_set(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

/// Record returned by the postal-code service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViaCepRecord {
    #[serde(default)]
    pub cep: String,
    #[serde(default)]
    pub logradouro: String,
    #[serde(default)]
    pub bairro: String,
    #[serde(default)]
    pub localidade: String,
    #[serde(default)]
    pub uf: String,
    #[serde(default)]
    pub erro: Option<ErrorFlag>,
}

impl ViaCepRecord {
    pub fn is_error(&self) -> bool {
        self.erro.as_ref().map(ErrorFlag::is_set).unwrap_or(false)
    }

    /// `"<street>, <neighborhood> - <city>/<UF>"`, absent parts omitted
    pub fn full_address(&self) -> String {
        let mut line = String::new();
        if !self.logradouro.is_empty() {
            line.push_str(&self.logradouro);
            line.push_str(", ");
        }
        if !self.bairro.is_empty() {
            line.push_str(&self.bairro);
            line.push_str(" - ");
        }
        line.push_str(&format!("{}/{}", self.localidade, self.uf));
        line
    }

    pub fn into_address(self) -> AddressResult {
        let full_address = Some(self.full_address());
        let non_empty = |s: String| (!s.is_empty()).then_some(s);
        AddressResult {
            postal_code: crate::postal_code::digits_only(&self.cep),
            city: self.localidade,
            state: self.uf.to_uppercase(),
            neighborhood: non_empty(self.bairro),
            street: non_empty(self.logradouro),
            full_address,
        }
    }
}

/// Address search responses are an array, or an error object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AddressSearchResponse {
    Many(Vec<ViaCepRecord>),
    Single(ViaCepRecord),
}

/// Reverse-geocoding response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReverseGeocodeResponse {
    #[serde(default)]
    pub address: Option<ReverseGeocodeAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReverseGeocodeAddress {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub municipality: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub road: Option<String>,
    pub suburb: Option<String>,
    pub neighbourhood: Option<String>,
}

fn first_non_empty<'a>(fields: &[&'a Option<String>]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|f| (*f).as_deref())
        .find(|s| !s.trim().is_empty())
}

impl ReverseGeocodeAddress {
    /// First non-empty of city, town, village, municipality
    pub fn locality(&self) -> Option<&str> {
        first_non_empty(&[&self.city, &self.town, &self.village, &self.municipality])
    }

    pub fn neighborhood(&self) -> Option<&str> {
        first_non_empty(&[&self.suburb, &self.neighbourhood])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viacep_record_conversion() {
        let body = r#"{"cep":"01310-100","logradouro":"Avenida Paulista","bairro":"Bela Vista","localidade":"São Paulo","uf":"SP"}"#;
        let record: ViaCepRecord = serde_json::from_str(body).unwrap();
        assert!(!record.is_error());

        let address = record.into_address();
        assert_eq!(address.postal_code, "01310100");
        assert_eq!(address.state, "SP");
        assert_eq!(
            address.full_address.as_deref(),
            Some("Avenida Paulista, Bela Vista - São Paulo/SP")
        );
    }

    #[test]
    fn test_viacep_error_flag_forms() {
        let bool_form: ViaCepRecord = serde_json::from_str(r#"{"erro":true}"#).unwrap();
        let text_form: ViaCepRecord = serde_json::from_str(r#"{"erro":"true"}"#).unwrap();
        assert!(bool_form.is_error());
        assert!(text_form.is_error());
    }

    #[test]
    fn test_full_address_omits_missing_parts() {
        let record = ViaCepRecord {
            cep: "13000000".into(),
            localidade: "Campinas".into(),
            uf: "SP".into(),
            ..Default::default()
        };
        assert_eq!(record.full_address(), "Campinas/SP");
        let address = record.into_address();
        assert_eq!(address.street, None);
        assert_eq!(address.neighborhood, None);
    }

    #[test]
    fn test_address_search_response_shapes() {
        let many: AddressSearchResponse =
            serde_json::from_str(r#"[{"cep":"80010-000","localidade":"Curitiba","uf":"PR"}]"#)
                .unwrap();
        assert!(matches!(many, AddressSearchResponse::Many(ref v) if v.len() == 1));

        let single: AddressSearchResponse = serde_json::from_str(r#"{"erro":true}"#).unwrap();
        assert!(matches!(single, AddressSearchResponse::Single(ref r) if r.is_error()));
    }

    #[test]
    fn test_reverse_geocode_locality_order() {
        let address = ReverseGeocodeAddress {
            city: Some("".into()),
            town: Some("Holambra".into()),
            village: Some("Vila".into()),
            suburb: None,
            neighbourhood: Some("Centro".into()),
            ..Default::default()
        };
        assert_eq!(address.locality(), Some("Holambra"));
        assert_eq!(address.neighborhood(), Some("Centro"));
    }

    #[test]
    fn test_services_order_and_optional_gas() {
        let contact = |name: &str| ServiceContact {
            organization: name.into(),
            phones: vec![PhoneEntry::new("Central", "156")],
            website: None,
        };
        let mut bundle = CityContacts {
            city: "Natal".into(),
            state: "RN".into(),
            prefeitura: contact("Prefeitura"),
            energia: contact("Cosern"),
            agua: contact("Caern"),
            gas: None,
        };
        let kinds: Vec<_> = bundle.services().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![ServiceKind::Prefeitura, ServiceKind::Energia, ServiceKind::Agua]
        );

        bundle.gas = Some(contact("Potigás"));
        assert_eq!(bundle.services().len(), 4);
    }
}
