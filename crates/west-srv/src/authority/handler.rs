//! Hickory request handler around [`NameResolver`].

use async_trait::async_trait;
use hickory_proto::op::{Header, LowerQuery, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, TXT};
use hickory_proto::rr::{RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use tracing::{error, trace};

use super::resolver::{Answer, AnswerData, NameResolver, QueryKind, Question, Rcode};

/// Serves the zone from a [`NameResolver`].
#[derive(Debug, Clone)]
pub struct ZoneHandler {
    resolver: NameResolver,
}

impl ZoneHandler {
    /// Wrap a resolver.
    pub const fn new(resolver: NameResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl RequestHandler for ZoneHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let builder = MessageResponseBuilder::from_message_request(request);
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_recursion_available(false);

        let records = if request.op_code() == OpCode::Query
            && request.message_type() == MessageType::Query
        {
            let queries = request.queries();
            let questions: Vec<Question> = queries.iter().map(question).collect();
            let resolution = self.resolver.resolve(&questions).await;

            trace!(
                src = %request.src(),
                questions = questions.len(),
                answers = resolution.answers.len(),
                rcode = ?resolution.rcode,
                "dns query"
            );

            header.set_response_code(response_code(resolution.rcode));
            records(queries, &resolution.answers)
        } else {
            header.set_response_code(ResponseCode::NotImp);
            Vec::new()
        };

        let response = builder.build(header, records.iter(), &[], &[], &[]);
        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "failed to send dns response");
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

fn question(query: &LowerQuery) -> Question {
    let kind = match query.query_type() {
        RecordType::A => QueryKind::Address,
        RecordType::TXT => QueryKind::Text,
        _ => QueryKind::Unsupported,
    };
    Question::new(query.name().to_string(), kind)
}

fn records(queries: &[LowerQuery], answers: &[Answer]) -> Vec<Record> {
    answers
        .iter()
        .filter_map(|answer| {
            let owner = queries.get(answer.question)?.original().name().clone();
            let rdata = match &answer.data {
                AnswerData::Address(ip) => RData::A(A::from(*ip)),
                AnswerData::Text(value) => RData::TXT(TXT::new(vec![value.clone()])),
            };
            Some(Record::from_rdata(owner, answer.ttl, rdata))
        })
        .collect()
}

const fn response_code(rcode: Rcode) -> ResponseCode {
    match rcode {
        Rcode::NoError => ResponseCode::NoError,
        Rcode::NameError => ResponseCode::NXDomain,
        Rcode::ServerFailure => ResponseCode::ServFail,
    }
}
